//! Live-instance collectors.
//!
//! A [`Collector<T>`] knows every currently alive [`Tracked<T>`] registered
//! with it. It holds weak observer links only: the values are owned by their
//! `Tracked` handles, which register on construction and deregister on drop.
//!
//! ```text
//! unregistered --Tracked::new--> registered --drop--> unregistered
//! ```
//!
//! The links live in a [`MemberContainer`], a `HashMap` unless the collector
//! names another one.
//!
//! # Examples
//!
//! ```
//! use singleton_collector::Tracked;
//!
//! struct Item { id: u32 }
//!
//! let items: Vec<_> = (0..3).map(|id| Tracked::new(Item { id })).collect();
//! let collector = items[0].collector().clone();
//!
//! let mut ids: Vec<u32> = collector.members().iter().map(|item| item.id).collect();
//! ids.sort();
//! assert_eq!(ids, vec![0, 1, 2]);
//!
//! drop(items);
//! assert!(collector.is_empty());
//! ```

use std::collections::{btree_map, hash_map, BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::{Singleton, SingletonApi, SingletonError};

/// Identity of a tracked value: the address of its allocation.
fn identity<T: ?Sized>(value: &Arc<T>) -> usize {
    Arc::as_ptr(value).cast::<()>() as usize
}

/// Storage for the weak links of a [`Collector`], keyed by identity.
///
/// Implemented for `HashMap` (the default) and `BTreeMap`, which visits
/// members in address order.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use std::sync::{Arc, Weak};
/// use singleton_collector::{Collector, Tracked};
///
/// struct Node(u8);
/// type Ordered = Collector<Node, BTreeMap<usize, Weak<Node>>>;
///
/// let collector = Arc::new(Ordered::default());
/// let node = Tracked::with_collector(&collector, Node(1));
/// assert_eq!(collector.len(), 1);
/// # drop(node);
/// ```
pub trait MemberContainer<T: ?Sized + 'static>: Default + Send + 'static {
    type Values<'a>: Iterator<Item = &'a Weak<T>>
    where
        Self: 'a;

    /// Adds `member` under `id` unless `id` is present. Returns whether it was
    /// added.
    fn insert(&mut self, id: usize, member: Weak<T>) -> bool;

    /// Removes `id`. Returns whether it was present.
    fn remove(&mut self, id: usize) -> bool;

    fn contains(&self, id: usize) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn values(&self) -> Self::Values<'_>;
}

impl<T: ?Sized + Send + Sync + 'static> MemberContainer<T> for HashMap<usize, Weak<T>> {
    type Values<'a>
        = hash_map::Values<'a, usize, Weak<T>>
    where
        Self: 'a;

    fn insert(&mut self, id: usize, member: Weak<T>) -> bool {
        match self.entry(id) {
            hash_map::Entry::Occupied(_) => false,
            hash_map::Entry::Vacant(slot) => {
                slot.insert(member);
                true
            }
        }
    }

    fn remove(&mut self, id: usize) -> bool {
        HashMap::remove(self, &id).is_some()
    }

    fn contains(&self, id: usize) -> bool {
        self.contains_key(&id)
    }

    fn len(&self) -> usize {
        HashMap::len(self)
    }

    fn values(&self) -> Self::Values<'_> {
        HashMap::values(self)
    }
}

impl<T: ?Sized + Send + Sync + 'static> MemberContainer<T> for BTreeMap<usize, Weak<T>> {
    type Values<'a>
        = btree_map::Values<'a, usize, Weak<T>>
    where
        Self: 'a;

    fn insert(&mut self, id: usize, member: Weak<T>) -> bool {
        match self.entry(id) {
            btree_map::Entry::Occupied(_) => false,
            btree_map::Entry::Vacant(slot) => {
                slot.insert(member);
                true
            }
        }
    }

    fn remove(&mut self, id: usize) -> bool {
        BTreeMap::remove(self, &id).is_some()
    }

    fn contains(&self, id: usize) -> bool {
        self.contains_key(&id)
    }

    fn len(&self) -> usize {
        BTreeMap::len(self)
    }

    fn values(&self) -> Self::Values<'_> {
        BTreeMap::values(self)
    }
}

/// The set of live tracked instances of `T`.
///
/// `T` may be unsized, so one collector can gather several concrete types
/// behind a trait object. `C` is the container holding the links.
pub struct Collector<T: ?Sized, C = HashMap<usize, Weak<T>>> {
    members: Mutex<C>,
    member_type: PhantomData<fn() -> Weak<T>>,
}

impl<T, C> Singleton for Collector<T, C>
where
    T: ?Sized + Send + Sync + 'static,
    C: MemberContainer<T>,
{
}

impl<T: ?Sized + Send + Sync + 'static> Collector<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T, C> Collector<T, C>
where
    T: ?Sized + Send + Sync + 'static,
    C: MemberContainer<T>,
{
    /// The collector for `T` in the process-wide singleton service, created on
    /// first use. Collectors with different containers are distinct.
    #[allow(deprecated)]
    pub fn global() -> Arc<Self> {
        crate::global().get_or_create(Self::default)
    }

    fn lock(&self) -> MutexGuard<'_, C> {
        self.members.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Add `member` to the set.
    ///
    /// # Errors
    ///
    /// - [`SingletonError::AlreadyRegistered`] if it is already present
    pub fn try_register(&self, member: &Arc<T>) -> Result<(), SingletonError> {
        let id = identity(member);
        if !self.lock().insert(id, Arc::downgrade(member)) {
            return Err(SingletonError::AlreadyRegistered {
                type_name: std::any::type_name::<T>(),
            });
        }
        tracing::trace!(type_name = std::any::type_name::<T>(), id, "registered member");
        Ok(())
    }

    /// Like [`Collector::try_register`], halting on double registration.
    pub fn register(&self, member: &Arc<T>) {
        self.try_register(member)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    /// Remove `member` from the set.
    ///
    /// # Errors
    ///
    /// - [`SingletonError::NotRegistered`] if it is absent
    pub fn try_deregister(&self, member: &Arc<T>) -> Result<(), SingletonError> {
        let id = identity(member);
        if !self.lock().remove(id) {
            return Err(SingletonError::NotRegistered {
                type_name: std::any::type_name::<T>(),
            });
        }
        tracing::trace!(type_name = std::any::type_name::<T>(), id, "deregistered member");
        Ok(())
    }

    /// Like [`Collector::try_deregister`], halting if `member` is absent.
    pub fn deregister(&self, member: &Arc<T>) {
        self.try_deregister(member)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    pub fn contains(&self, member: &Arc<T>) -> bool {
        self.lock().contains(identity(member))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Live view of the current members, in the container's order.
    ///
    /// The view holds the collector's lock: dropping a `Tracked` of this
    /// collector on the same thread while the view is alive deadlocks.
    pub fn members(&self) -> Members<'_, T, C> {
        Members {
            guard: self.lock(),
            member_type: PhantomData,
        }
    }
}

impl<T, C> Default for Collector<T, C>
where
    T: ?Sized + Send + Sync + 'static,
    C: MemberContainer<T>,
{
    fn default() -> Self {
        Collector {
            members: Mutex::new(C::default()),
            member_type: PhantomData,
        }
    }
}

impl<T: ?Sized + 'static, C: MemberContainer<T>> fmt::Debug for Collector<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.members.lock().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("Collector")
            .field("type_name", &std::any::type_name::<T>())
            .field("len", &len)
            .finish()
    }
}

/// Locked view over a collector's members.
pub struct Members<'a, T: ?Sized, C = HashMap<usize, Weak<T>>> {
    guard: MutexGuard<'a, C>,
    member_type: PhantomData<fn() -> Weak<T>>,
}

impl<'a, T: ?Sized + 'static, C: MemberContainer<T>> Members<'a, T, C> {
    pub fn iter(&self) -> MembersIter<'_, T, C> {
        MembersIter {
            inner: self.guard.values(),
        }
    }

    pub fn len(&self) -> usize {
        self.guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard.is_empty()
    }
}

impl<'m, 'a, T, C> IntoIterator for &'m Members<'a, T, C>
where
    T: ?Sized + 'static,
    C: MemberContainer<T>,
{
    type Item = Arc<T>;
    type IntoIter = MembersIter<'m, T, C>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the members of a [`Members`] view.
pub struct MembersIter<'m, T: ?Sized + 'static, C: MemberContainer<T>> {
    inner: C::Values<'m>,
}

impl<'m, T: ?Sized + 'static, C: MemberContainer<T>> Iterator for MembersIter<'m, T, C> {
    type Item = Arc<T>;

    fn next(&mut self) -> Option<Arc<T>> {
        // Entries leave the container before their value is dropped, so an
        // upgrade only fails for a value whose `Tracked` is mid-drop on another
        // thread.
        self.inner.find_map(Weak::upgrade)
    }
}

/// An owned value registered in a [`Collector`] for as long as it lives.
///
/// `Tracked` is deliberately not `Clone`: a copy would be a second instance
/// the collector never saw. Moving the handle keeps the value in place, so its
/// identity in the collector is stable.
pub struct Tracked<T, C = HashMap<usize, Weak<T>>>
where
    T: ?Sized + Send + Sync + 'static,
    C: MemberContainer<T>,
{
    value: Arc<T>,
    collector: Arc<Collector<T, C>>,
}

impl<T: Send + Sync + 'static> Tracked<T> {
    /// Track `value` in the process-wide collector for `T`.
    pub fn new(value: T) -> Self {
        Tracked::from_arc(Arc::new(value))
    }
}

impl<T: ?Sized + Send + Sync + 'static> Tracked<T> {
    /// Track an already shared value in the process-wide collector for `T`.
    ///
    /// # Panics
    ///
    /// If `value` is already tracked there.
    pub fn from_arc(value: Arc<T>) -> Self {
        Self::from_arc_in(&Collector::global(), value)
    }
}

impl<T, C> Tracked<T, C>
where
    T: Send + Sync + 'static,
    C: MemberContainer<T>,
{
    /// Track `value` in `collector`.
    pub fn with_collector(collector: &Arc<Collector<T, C>>, value: T) -> Self {
        Tracked::from_arc_in(collector, Arc::new(value))
    }
}

impl<T, C> Tracked<T, C>
where
    T: ?Sized + Send + Sync + 'static,
    C: MemberContainer<T>,
{
    /// Track an already shared value in `collector`.
    ///
    /// # Panics
    ///
    /// If `value` is already tracked there.
    pub fn from_arc_in(collector: &Arc<Collector<T, C>>, value: Arc<T>) -> Self {
        collector.register(&value);
        Tracked {
            value,
            collector: collector.clone(),
        }
    }

    /// Track an already shared value in `collector`.
    ///
    /// # Errors
    ///
    /// - [`SingletonError::AlreadyRegistered`] if `value` is already tracked there
    pub fn try_from_arc_in(
        collector: &Arc<Collector<T, C>>,
        value: Arc<T>,
    ) -> Result<Self, SingletonError> {
        collector.try_register(&value)?;
        Ok(Tracked {
            value,
            collector: collector.clone(),
        })
    }

    pub fn arc(&self) -> &Arc<T> {
        &self.value
    }

    pub fn collector(&self) -> &Arc<Collector<T, C>> {
        &self.collector
    }
}

impl<T, C> Deref for Tracked<T, C>
where
    T: ?Sized + Send + Sync + 'static,
    C: MemberContainer<T>,
{
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T, C> Drop for Tracked<T, C>
where
    T: ?Sized + Send + Sync + 'static,
    C: MemberContainer<T>,
{
    fn drop(&mut self) {
        if let Err(err) = self.collector.try_deregister(&self.value) {
            if std::thread::panicking() {
                tracing::error!(%err, "tracked instance missing from its collector");
            } else {
                panic!("{err}");
            }
        }
    }
}

impl<T, C> fmt::Debug for Tracked<T, C>
where
    T: ?Sized + Send + Sync + fmt::Debug + 'static,
    C: MemberContainer<T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Tracked").field(&&*self.value).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashSet;

    #[derive(Debug)]
    struct IntItem {
        id: i32,
    }

    fn ids(collector: &Collector<IntItem>) -> HashSet<i32> {
        collector.members().iter().map(|item| item.id).collect()
    }

    #[test]
    fn test_count_follows_lifetimes() {
        let collector = Arc::new(Collector::new());
        assert!(collector.is_empty());

        let mut items: Vec<_> = (0..5)
            .map(|id| Tracked::with_collector(&collector, IntItem { id }))
            .collect();
        assert_eq!(collector.len(), 5);

        let removed = items.remove(2);
        let removed_arc = removed.arc().clone();
        assert!(collector.contains(&removed_arc));
        drop(removed);
        assert_eq!(collector.len(), 4);
        assert!(!collector.contains(&removed_arc));
        assert!(!ids(&collector).contains(&2));

        drop(items);
        assert!(collector.is_empty());
    }

    #[test]
    fn test_array_of_ten_visits_every_value_once() {
        let collector = Arc::new(Collector::new());
        let items: [Tracked<IntItem>; 10] =
            std::array::from_fn(|i| Tracked::with_collector(&collector, IntItem { id: i as i32 }));

        let members = collector.members();
        assert_eq!(members.len(), 10);
        let visited: Vec<i32> = members.iter().map(|item| item.id).collect();
        drop(members);

        let unique: HashSet<i32> = visited.iter().copied().collect();
        assert_eq!(visited.len(), 10);
        assert_eq!(unique, (0..10).collect::<HashSet<_>>());

        drop(items);
        assert!(collector.is_empty());
    }

    #[test]
    fn test_zero_members() {
        let collector: Collector<IntItem> = Collector::new();
        let members = collector.members();
        assert!(members.is_empty());
        assert_eq!((&members).into_iter().count(), 0);
    }

    #[test]
    #[should_panic(expected = "Instance already registered in collector")]
    fn test_second_registration_halts() {
        let collector = Arc::new(Collector::new());
        let item = Tracked::with_collector(&collector, IntItem { id: 1 });
        collector.register(item.arc());
    }

    #[test]
    fn test_try_register_reports_duplicate() {
        let collector = Arc::new(Collector::new());
        let item = Tracked::with_collector(&collector, IntItem { id: 1 });
        assert!(matches!(
            collector.try_register(item.arc()),
            Err(SingletonError::AlreadyRegistered { .. })
        ));
        assert!(matches!(
            Tracked::try_from_arc_in(&collector, item.arc().clone()),
            Err(SingletonError::AlreadyRegistered { .. })
        ));
        assert_eq!(collector.len(), 1);
    }

    #[test]
    #[should_panic(expected = "Instance not registered in collector")]
    fn test_deregister_absent_halts() {
        let collector: Collector<IntItem> = Collector::new();
        collector.deregister(&Arc::new(IntItem { id: 0 }));
    }

    #[test]
    fn test_moving_handle_keeps_identity() {
        let collector = Arc::new(Collector::new());
        let item = Tracked::with_collector(&collector, IntItem { id: 9 });
        let arc = item.arc().clone();

        let moved = Box::new(item);
        assert!(collector.contains(&arc));
        assert_eq!(moved.id, 9);
        drop(moved);
        assert!(collector.is_empty());
    }

    #[test]
    fn test_value_outlives_registration() {
        let collector = Arc::new(Collector::new());
        let item = Tracked::with_collector(&collector, IntItem { id: 4 });
        let kept = item.arc().clone();
        drop(item);

        assert!(collector.is_empty());
        assert_eq!(kept.id, 4);
    }

    #[test]
    fn test_trait_object_collector() {
        trait Data: Send + Sync {
            fn render(&self) -> String;
        }
        struct Int(i32);
        struct Text(String);
        impl Data for Int {
            fn render(&self) -> String {
                self.0.to_string()
            }
        }
        impl Data for Text {
            fn render(&self) -> String {
                self.0.clone()
            }
        }

        let collector: Arc<Collector<dyn Data>> = Arc::new(Collector::new());
        let mut tracked = Vec::new();
        for i in 0..3 {
            tracked.push(Tracked::from_arc_in(&collector, Arc::new(Int(i)) as Arc<dyn Data>));
            tracked.push(Tracked::from_arc_in(
                &collector,
                Arc::new(Text(format!("S{i}"))) as Arc<dyn Data>,
            ));
        }

        let rendered: HashSet<String> = collector.members().iter().map(|d| d.render()).collect();
        let expected: HashSet<String> = ["0", "1", "2", "S0", "S1", "S2"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(rendered, expected);

        tracked.clear();
        assert!(collector.is_empty());
    }

    #[test]
    fn test_ordered_container_visits_by_address() {
        type Ordered = Collector<IntItem, BTreeMap<usize, Weak<IntItem>>>;

        let collector = Arc::new(Ordered::default());
        let items: Vec<_> = (0..6)
            .map(|id| Tracked::with_collector(&collector, IntItem { id }))
            .collect();
        assert_eq!(collector.len(), 6);

        let addresses: Vec<usize> = collector
            .members()
            .iter()
            .map(|item| identity(&item))
            .collect();
        let mut sorted = addresses.clone();
        sorted.sort_unstable();
        assert_eq!(addresses, sorted);

        let ids: HashSet<i32> = collector.members().iter().map(|item| item.id).collect();
        assert_eq!(ids, (0..6).collect::<HashSet<_>>());

        assert!(matches!(
            collector.try_register(items[0].arc()),
            Err(SingletonError::AlreadyRegistered { .. })
        ));

        drop(items);
        assert!(collector.is_empty());
    }

    #[test]
    #[serial]
    fn test_global_collectors_are_per_container() {
        struct Marker;

        let hashed = Tracked::new(Marker);
        let ordered = Collector::<Marker, BTreeMap<usize, Weak<Marker>>>::global();
        assert!(ordered.is_empty());
        assert_eq!(Collector::<Marker>::global().len(), 1);

        drop(hashed);
    }

    #[test]
    fn test_debug_output() {
        let collector = Arc::new(Collector::new());
        let item = Tracked::with_collector(&collector, IntItem { id: 3 });
        assert_eq!(format!("{:?}", item), "Tracked(IntItem { id: 3 })");
        assert!(format!("{:?}", collector).contains("len: 1"));
    }

    #[test]
    #[serial]
    fn test_global_collector_is_shared() {
        struct GlobalItem(u8);

        let a = Tracked::new(GlobalItem(1));
        let b = Tracked::new(GlobalItem(2));
        assert!(Arc::ptr_eq(a.collector(), b.collector()));
        assert!(Arc::ptr_eq(a.collector(), &Collector::<GlobalItem>::global()));
        assert_eq!(a.collector().len(), 2);

        let sum: u32 = a
            .collector()
            .members()
            .iter()
            .map(|item| u32::from(item.0))
            .sum();
        assert_eq!(sum, 3);

        let collector = a.collector().clone();
        drop(a);
        drop(b);
        assert!(collector.is_empty());
    }
}
