//! Event data stores.
//!
//! The [`Whiteboard`] holds one [`SlotStore`] per concurrency slot; data
//! put into one slot is never visible through another. Slot-independent
//! data (detector conditions, calibrations) lives in the versioned
//! [`ConditionStore`] instead.

pub mod conditions;
pub mod store;
pub mod whiteboard;

use std::any::Any;
use std::sync::Arc;

pub use conditions::ConditionStore;
pub use store::SlotStore;
pub use whiteboard::Whiteboard;

/// A produced data object. Immutable once stored; readers share it.
pub type DataObject = Arc<dyn Any + Send + Sync>;

/// Wrap a value as a [`DataObject`].
pub fn data_object<T: Any + Send + Sync>(value: T) -> DataObject {
    Arc::new(value)
}

/// Downcast a stored object to its concrete type.
pub fn downcast<T: Any + Send + Sync>(object: DataObject) -> Option<Arc<T>> {
    object.downcast::<T>().ok()
}
