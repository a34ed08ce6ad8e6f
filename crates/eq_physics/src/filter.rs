//! Query collision filters
//!
//! A [`CollisionFilter`] is built per query. It holds at most
//! [`MAX_FILTER_OBJECTS`] keys plus category flags, and
//! [`check_allow_contact_test`] is the single gate every query path uses
//! to decide whether an object may be tested.

use crate::arena::ObjectHandle;
use crate::body::{CollisionObject, ObjectFlags, ObjectKind};
use std::ops::{BitOr, BitOrAssign};

/// Maximum number of keys a filter holds
pub const MAX_FILTER_OBJECTS: usize = 8;

/// How the key list is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterType {
    /// Listed objects are skipped
    #[default]
    Exclude,
    /// Only listed objects are tested
    IncludeOnly,
}

/// Category restrictions of a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FilterFlags(u32);

impl FilterFlags {
    pub const NONE: Self = Self(0);
    /// The key list applies to static and ghost objects
    pub const STATIC_OBJECTS: Self = Self(1 << 0);
    /// The key list applies to dynamic objects
    pub const DYNAMIC_OBJECTS: Self = Self(1 << 1);
    /// Keys are compared against object user data
    pub const BY_USERDATA: Self = Self(1 << 2);
    /// Test objects flagged as no-raycast too
    pub const FORCE_RAYCAST: Self = Self(1 << 3);
    /// Never test static or ghost objects
    pub const DISALLOW_STATIC: Self = Self(1 << 4);
    /// Never test dynamic objects
    pub const DISALLOW_DYNAMIC: Self = Self(1 << 5);

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FilterFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for FilterFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// One entry of a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKey {
    Object(ObjectHandle),
    UserData(u128),
}

/// Bounded allow/deny list for queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionFilter {
    keys: [FilterKey; MAX_FILTER_OBJECTS],
    len: usize,
    filter_type: FilterType,
    flags: FilterFlags,
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self::new(FilterType::Exclude)
    }
}

impl CollisionFilter {
    /// Create an empty filter
    pub fn new(filter_type: FilterType) -> Self {
        Self {
            keys: [FilterKey::Object(ObjectHandle::NULL); MAX_FILTER_OBJECTS],
            len: 0,
            filter_type,
            flags: FilterFlags::NONE,
        }
    }

    /// Filter skipping a single object
    pub fn exclude_object(handle: ObjectHandle) -> Self {
        let mut filter = Self::new(FilterType::Exclude);
        filter.add_object(handle);
        filter
    }

    /// Filter testing only the given objects (extra entries past the cap are dropped)
    pub fn include_only(handles: &[ObjectHandle]) -> Self {
        let mut filter = Self::new(FilterType::IncludeOnly);
        for handle in handles {
            filter.add_object(*handle);
        }
        filter
    }

    /// Set category flags
    pub fn with_flags(mut self, flags: FilterFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    pub fn flags(&self) -> FilterFlags {
        self.flags
    }

    /// Add an object. No-op when the filter is full.
    pub fn add_object(&mut self, handle: ObjectHandle) {
        self.push(FilterKey::Object(handle));
    }

    /// Add a user-data key, matched when [`FilterFlags::BY_USERDATA`] is set.
    /// No-op when the filter is full.
    pub fn add_user_data(&mut self, user_data: u128) {
        self.push(FilterKey::UserData(user_data));
    }

    fn push(&mut self, key: FilterKey) {
        if self.len < MAX_FILTER_OBJECTS {
            self.keys[self.len] = key;
            self.len += 1;
        }
    }

    /// Check if the object handle is listed
    pub fn has_object(&self, handle: ObjectHandle) -> bool {
        self.keys().iter().any(|key| *key == FilterKey::Object(handle))
    }

    /// Check if the user-data value is listed
    pub fn has_user_data(&self, user_data: u128) -> bool {
        self.keys().iter().any(|key| *key == FilterKey::UserData(user_data))
    }

    /// Stored keys
    pub fn keys(&self) -> &[FilterKey] {
        &self.keys[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == MAX_FILTER_OBJECTS
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    fn matches(&self, handle: ObjectHandle, object: &CollisionObject) -> bool {
        if self.flags.contains(FilterFlags::BY_USERDATA) {
            self.has_user_data(object.user_data())
        } else {
            self.has_object(handle)
        }
    }

    fn list_applies_to(&self, kind: ObjectKind) -> bool {
        let statics = self.flags.contains(FilterFlags::STATIC_OBJECTS);
        let dynamics = self.flags.contains(FilterFlags::DYNAMIC_OBJECTS);
        if !statics && !dynamics {
            return true;
        }
        match kind {
            ObjectKind::Dynamic => dynamics,
            ObjectKind::Static | ObjectKind::Ghost => statics,
        }
    }
}

/// Decide whether a query may test an object
pub fn check_allow_contact_test(
    filter: Option<&CollisionFilter>,
    handle: ObjectHandle,
    object: &CollisionObject,
) -> bool {
    let force_raycast = filter.map_or(false, |f| f.flags.contains(FilterFlags::FORCE_RAYCAST));
    if object.flags().contains(ObjectFlags::NO_RAYCAST) && !force_raycast {
        return false;
    }

    let Some(filter) = filter else {
        return true;
    };

    let is_dynamic = object.is_dynamic();
    if filter.flags.contains(FilterFlags::DISALLOW_STATIC) && !is_dynamic {
        return false;
    }
    if filter.flags.contains(FilterFlags::DISALLOW_DYNAMIC) && is_dynamic {
        return false;
    }

    if !filter.list_applies_to(object.kind()) {
        return true;
    }

    match filter.filter_type {
        FilterType::Exclude => !filter.matches(handle, object),
        FilterType::IncludeOnly => filter.matches(handle, object),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ObjectArena;
    use crate::body::ObjectDesc;
    use crate::collider::ColliderShape;

    fn objects() -> (ObjectArena<CollisionObject>, ObjectHandle, ObjectHandle) {
        let mut arena = ObjectArena::new();
        let dynamic = arena.insert(
            ObjectDesc::new(ColliderShape::sphere(1.0)).with_user_data(7).build().unwrap(),
        );
        let mut ground = ObjectDesc::new(ColliderShape::cuboid(10.0, 1.0, 10.0))
            .with_user_data(9)
            .build()
            .unwrap();
        ground.set_kind(ObjectKind::Static);
        let ground = arena.insert(ground);
        (arena, dynamic, ground)
    }

    #[test]
    fn test_single_object_filter() {
        let (_, p, q) = objects();
        let filter = CollisionFilter::exclude_object(p);
        assert!(filter.has_object(p));
        assert!(!filter.has_object(q));
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn test_capacity_is_capped() {
        let (_, p, _) = objects();
        let mut filter = CollisionFilter::new(FilterType::Exclude);
        for i in 0..20 {
            filter.add_object(p);
            filter.add_user_data(i);
        }
        assert_eq!(filter.len(), MAX_FILTER_OBJECTS);
        assert!(filter.is_full());

        filter.clear();
        assert!(filter.is_empty());
    }

    #[test]
    fn test_exclude_and_include_only() {
        let (arena, p, q) = objects();
        let po = arena.get(p).unwrap();
        let qo = arena.get(q).unwrap();

        let exclude = CollisionFilter::exclude_object(p);
        assert!(!check_allow_contact_test(Some(&exclude), p, po));
        assert!(check_allow_contact_test(Some(&exclude), q, qo));

        let include = CollisionFilter::include_only(&[p]);
        assert!(check_allow_contact_test(Some(&include), p, po));
        assert!(!check_allow_contact_test(Some(&include), q, qo));

        assert!(check_allow_contact_test(None, p, po));
    }

    #[test]
    fn test_is_idempotent() {
        let (arena, p, q) = objects();
        let filter = CollisionFilter::include_only(&[q]).with_flags(FilterFlags::DISALLOW_DYNAMIC);
        for handle in [p, q] {
            let object = arena.get(handle).unwrap();
            let first = check_allow_contact_test(Some(&filter), handle, object);
            for _ in 0..5 {
                assert_eq!(check_allow_contact_test(Some(&filter), handle, object), first);
            }
        }
    }

    #[test]
    fn test_category_flags() {
        let (arena, p, q) = objects();
        let po = arena.get(p).unwrap();
        let qo = arena.get(q).unwrap();

        let no_static = CollisionFilter::default().with_flags(FilterFlags::DISALLOW_STATIC);
        assert!(check_allow_contact_test(Some(&no_static), p, po));
        assert!(!check_allow_contact_test(Some(&no_static), q, qo));

        let no_dynamic = CollisionFilter::default().with_flags(FilterFlags::DISALLOW_DYNAMIC);
        assert!(!check_allow_contact_test(Some(&no_dynamic), p, po));
        assert!(check_allow_contact_test(Some(&no_dynamic), q, qo));

        // Include-only list scoped to dynamic objects lets statics through
        let scoped = CollisionFilter::include_only(&[p]).with_flags(FilterFlags::DYNAMIC_OBJECTS);
        assert!(check_allow_contact_test(Some(&scoped), q, qo));
        assert!(check_allow_contact_test(Some(&scoped), p, po));
    }

    #[test]
    fn test_by_user_data() {
        let (arena, p, q) = objects();
        let mut filter = CollisionFilter::new(FilterType::Exclude).with_flags(FilterFlags::BY_USERDATA);
        filter.add_user_data(9);

        assert!(check_allow_contact_test(Some(&filter), p, arena.get(p).unwrap()));
        assert!(!check_allow_contact_test(Some(&filter), q, arena.get(q).unwrap()));
    }

    #[test]
    fn test_no_raycast_needs_force() {
        let (mut arena, p, _) = objects();
        arena.get_mut(p).unwrap().set_flags(ObjectFlags::NO_RAYCAST);
        let object = arena.get(p).unwrap();

        assert!(!check_allow_contact_test(None, p, object));
        let forced = CollisionFilter::default().with_flags(FilterFlags::FORCE_RAYCAST);
        assert!(check_allow_contact_test(Some(&forced), p, object));
    }
}
