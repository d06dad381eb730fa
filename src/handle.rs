//! Generational handle registries for engine objects.
//!
//! C callers manipulate engine objects through `u64` handles rather than raw
//! pointers. A handle packs a slot index and a generation counter; the slot
//! registry rejects stale or foreign handles instead of dereferencing freed
//! memory, and refuses to destroy an object that is still borrowed by
//! another handle.

use std::sync::Arc;

use parking_lot::Mutex;

/// Packed slot index + generation. The all-zero value is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawHandle {
    pub index: u32,
    pub generation: u32,
}

impl RawHandle {
    pub(crate) fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    pub(crate) fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

/// Outcome of a destroy request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemoveError {
    /// The handle is stale, foreign or zero.
    Invalid,
    /// Another handle still holds a borrow of the object.
    Busy,
}

struct Slot<T> {
    // Starts at 1; 0 is reserved so the zero handle is always invalid.
    generation: u32,
    value: Option<Arc<T>>,
}

struct Slots<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

/// A typed slot registry. One static instance exists per handle kind.
pub(crate) struct Registry<T> {
    inner: Mutex<Slots<T>>,
}

impl<T> Registry<T> {
    pub(crate) const fn new() -> Self {
        Self {
            inner: Mutex::new(Slots {
                slots: Vec::new(),
                free: Vec::new(),
            }),
        }
    }

    /// Store a value and hand out its handle.
    pub(crate) fn insert(&self, value: T) -> RawHandle {
        let inner = &mut *self.inner.lock();
        let value = Arc::new(value);
        if let Some(index) = inner.free.pop() {
            let slot = &mut inner.slots[index as usize];
            slot.value = Some(value);
            RawHandle {
                index,
                generation: slot.generation,
            }
        } else {
            let index = inner.slots.len() as u32;
            inner.slots.push(Slot {
                generation: 1,
                value: Some(value),
            });
            RawHandle {
                index,
                generation: 1,
            }
        }
    }

    /// Resolve a handle to its object, or None if stale/foreign/zero.
    pub(crate) fn get(&self, handle: RawHandle) -> Option<Arc<T>> {
        let inner = self.inner.lock();
        let slot = inner.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.clone()
    }

    /// Drop the object behind a handle.
    ///
    /// Fails with `Busy` while other handles (or in-flight calls on other
    /// threads) still hold the object, so "destroy while borrowed" is a
    /// reported error rather than a use-after-free.
    pub(crate) fn remove(&self, handle: RawHandle) -> Result<(), RemoveError> {
        let inner = &mut *self.inner.lock();
        let slot = inner
            .slots
            .get_mut(handle.index as usize)
            .ok_or(RemoveError::Invalid)?;
        if slot.generation != handle.generation {
            return Err(RemoveError::Invalid);
        }
        match &slot.value {
            None => Err(RemoveError::Invalid),
            Some(arc) if Arc::strong_count(arc) > 1 => Err(RemoveError::Busy),
            Some(_) => {
                slot.value = None;
                // Generation 0 stays reserved for the invalid handle.
                slot.generation = slot.generation.wrapping_add(1).max(1);
                inner.free.push(handle.index);
                Ok(())
            }
        }
    }
}

/// Define a `#[repr(C)]` handle newtype for one object kind.
///
/// The C side sees a plain struct holding a `u64`; `0` is the invalid
/// handle returned by failed factories.
macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(C)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name {
            _h: u64,
        }

        impl $name {
            /// The invalid (zero) handle.
            pub const fn invalid() -> Self {
                Self { _h: 0 }
            }

            /// Whether this handle has ever been issued by a factory.
            pub const fn is_valid(self) -> bool {
                self._h != 0
            }

            pub(crate) fn from_raw(raw: $crate::handle::RawHandle) -> Self {
                Self { _h: raw.to_bits() }
            }

            pub(crate) fn raw(self) -> $crate::handle::RawHandle {
                $crate::handle::RawHandle::from_bits(self._h)
            }
        }
    };
}

pub(crate) use define_handle;

#[cfg(test)]
mod tests {
    use super::*;

    static REG: Registry<String> = Registry::new();

    #[test]
    fn insert_get_remove() {
        let h = REG.insert("hello".to_string());
        assert_eq!(REG.get(h).as_deref().map(String::as_str), Some("hello"));

        REG.remove(h).expect("first remove succeeds");
        assert!(REG.get(h).is_none());
        assert_eq!(REG.remove(h), Err(RemoveError::Invalid));
    }

    #[test]
    fn stale_generation_is_rejected() {
        let reg: Registry<u32> = Registry::new();
        let h1 = reg.insert(1);
        reg.remove(h1).unwrap();

        // The slot is reused with a bumped generation.
        let h2 = reg.insert(2);
        assert_eq!(h1.index, h2.index);
        assert_ne!(h1.generation, h2.generation);
        assert!(reg.get(h1).is_none());
        assert_eq!(reg.get(h2).as_deref(), Some(&2));
    }

    #[test]
    fn remove_while_borrowed_is_busy() {
        let reg: Registry<u32> = Registry::new();
        let h = reg.insert(7);

        let borrow = reg.get(h).unwrap();
        assert_eq!(reg.remove(h), Err(RemoveError::Busy));

        drop(borrow);
        assert_eq!(reg.remove(h), Ok(()));
    }

    define_handle!(TestHandle);

    #[test]
    fn zero_handle_is_invalid() {
        let h = TestHandle::invalid();
        assert!(!h.is_valid());
        assert!(REG.get(h.raw()).is_none());
    }
}
