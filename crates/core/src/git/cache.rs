//! In-memory cache of decompressed objects.
//!
//! Delta chains hit the same base object repeatedly; caching the inflated
//! bytes per pack-local offset avoids re-inflating them. Buffers are handed
//! out as shared `Rc` slices so every consumer gets an independent cursor
//! over the same bytes. The cache is unbounded for the lifetime of one
//! store, which matches one oracle invocation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::git::ObjectKind;

#[derive(Default)]
pub struct ObjectCache {
    entries: RefCell<HashMap<u64, (ObjectKind, Rc<Vec<u8>>)>>,
}

impl ObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, offset: u64) -> Option<(ObjectKind, Rc<Vec<u8>>)> {
        self.entries.borrow().get(&offset).cloned()
    }

    pub fn insert(&self, offset: u64, kind: ObjectKind, bytes: Vec<u8>) -> (ObjectKind, Rc<Vec<u8>>) {
        let shared = Rc::new(bytes);
        self.entries
            .borrow_mut()
            .insert(offset, (kind, Rc::clone(&shared)));
        (kind, shared)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_shares_the_buffer() {
        let cache = ObjectCache::new();
        let (_, first) = cache.insert(7, ObjectKind::Blob, b"content".to_vec());
        let (kind, second) = cache.get(7).unwrap();
        assert_eq!(kind, ObjectKind::Blob);
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn miss_returns_none() {
        let cache = ObjectCache::new();
        assert!(cache.get(0).is_none());
    }
}
