//! Shared entity handles.

use super::{to_fields, Entity};
use crate::error::{CoreError, CoreResult};
use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use unitwork_storage::{Fields, RecordKey};

/// A shared handle to one entity instance.
///
/// Clones of a handle point at the same instance. Within one session,
/// everything that resolves to the same key yields a handle to the same
/// instance, so a change made through one handle is seen through all of
/// them and picked up by the dirty check at the next flush.
///
/// Handles are deliberately `!Send`: a session and its entities belong to a
/// single thread.
pub struct EntityRef<T> {
    inner: Rc<RefCell<T>>,
}

impl<T: Entity> EntityRef<T> {
    /// Wraps a new (transient) entity.
    #[must_use]
    pub fn new(entity: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(entity)),
        }
    }

    /// Borrows the entity.
    ///
    /// # Panics
    ///
    /// Panics if the entity is currently mutably borrowed.
    #[must_use]
    pub fn borrow(&self) -> Ref<'_, T> {
        self.inner.borrow()
    }

    /// Mutably borrows the entity.
    ///
    /// # Panics
    ///
    /// Panics if the entity is currently borrowed.
    #[must_use]
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.inner.borrow_mut()
    }

    /// Returns a copy of the entity's current state.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().clone()
    }

    /// Applies a change to the entity.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.borrow_mut())
    }

    /// Returns the entity's record key.
    #[must_use]
    pub fn key(&self) -> RecordKey {
        self.inner.borrow().key()
    }

    /// Returns true if both handles point at the same instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn try_key(&self) -> CoreResult<RecordKey> {
        Ok(self.try_borrow()?.key())
    }

    pub(crate) fn try_get(&self) -> CoreResult<T> {
        Ok(self.try_borrow()?.clone())
    }

    pub(crate) fn try_fields(&self) -> CoreResult<Fields> {
        to_fields(&*self.try_borrow()?)
    }

    pub(crate) fn replace(&self, value: T) -> CoreResult<()> {
        let mut entity = self.inner.try_borrow_mut().map_err(|_| borrowed::<T>())?;
        *entity = value;
        Ok(())
    }

    pub(crate) fn erase(&self) -> Rc<dyn ManagedInstance> {
        let inner: Rc<RefCell<T>> = Rc::clone(&self.inner);
        inner
    }

    /// Recovers a typed handle from a managed instance.
    ///
    /// Returns `None` if the instance holds a different entity type.
    pub(crate) fn restore(instance: &Rc<dyn ManagedInstance>) -> Option<Self> {
        Rc::clone(instance)
            .into_any()
            .downcast::<RefCell<T>>()
            .ok()
            .map(|inner| Self { inner })
    }

    pub(crate) fn is_instance(&self, instance: &Rc<dyn ManagedInstance>) -> bool {
        Rc::as_ptr(&self.inner).cast::<()>() == Rc::as_ptr(instance).cast::<()>()
    }

    fn try_borrow(&self) -> CoreResult<Ref<'_, T>> {
        self.inner.try_borrow().map_err(|_| borrowed::<T>())
    }
}

impl<T> Clone for EntityRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for EntityRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(entity) => f.debug_tuple("EntityRef").field(&*entity).finish(),
            Err(_) => f.write_str("EntityRef(<borrowed>)"),
        }
    }
}

fn borrowed<T: Entity>() -> CoreError {
    CoreError::EntityBorrowed {
        entity_type: T::ENTITY_TYPE.to_string(),
    }
}

/// Type-erased view of a managed instance, as held by the identity map.
pub(crate) trait ManagedInstance {
    /// Reads the instance's current fields.
    fn read_fields(&self) -> CoreResult<Fields>;

    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

impl<T: Entity> ManagedInstance for RefCell<T> {
    fn read_fields(&self) -> CoreResult<Fields> {
        let entity = self.try_borrow().map_err(|_| borrowed::<T>())?;
        to_fields(&*entity)
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

/// Returns true if both erased handles point at the same instance.
pub(crate) fn same_instance(a: &Rc<dyn ManagedInstance>, b: &Rc<dyn ManagedInstance>) -> bool {
    Rc::as_ptr(a).cast::<()>() == Rc::as_ptr(b).cast::<()>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use unitwork_storage::Value;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Member {
        id: i64,
        age: i32,
    }

    impl Entity for Member {
        const ENTITY_TYPE: &'static str = "members";

        fn id(&self) -> i64 {
            self.id
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Account {
        id: i64,
    }

    impl Entity for Account {
        const ENTITY_TYPE: &'static str = "accounts";

        fn id(&self) -> i64 {
            self.id
        }
    }

    #[test]
    fn clones_share_the_instance() {
        let a = EntityRef::new(Member { id: 1, age: 30 });
        let b = a.clone();
        b.update(|m| m.age = 40);
        assert_eq!(a.borrow().age, 40);
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn equal_values_are_different_instances() {
        let a = EntityRef::new(Member { id: 1, age: 30 });
        let b = EntityRef::new(Member { id: 1, age: 30 });
        assert!(!a.ptr_eq(&b));
        assert!(!same_instance(&a.erase(), &b.erase()));
    }

    #[test]
    fn erase_and_restore() {
        let a = EntityRef::new(Member { id: 1, age: 30 });
        let erased = a.erase();
        assert!(a.is_instance(&erased));

        let restored = EntityRef::<Member>::restore(&erased).unwrap();
        assert!(restored.ptr_eq(&a));
        assert!(EntityRef::<Account>::restore(&erased).is_none());
    }

    #[test]
    fn erased_reads_current_fields() {
        let a = EntityRef::new(Member { id: 1, age: 30 });
        let erased = a.erase();
        a.update(|m| m.age = 31);
        assert_eq!(erased.read_fields().unwrap()["age"], Value::from(31));
    }

    #[test]
    fn borrowed_instance_is_reported() {
        let a = EntityRef::new(Member { id: 1, age: 30 });
        let erased = a.erase();
        let _guard = a.borrow_mut();
        assert!(matches!(
            erased.read_fields(),
            Err(CoreError::EntityBorrowed { .. })
        ));
        assert!(a.try_key().is_err());
    }
}
