use fleetdeck_core::persist::{StorageBackend, StorageError};

/// Calls the closure with browser localStorage, if available. No-op on non-WASM.
#[allow(unused_variables)]
pub fn with_local_storage<R>(f: impl FnOnce(&web_sys::Storage) -> R) -> Option<R> {
    #[cfg(target_family = "wasm")]
    {
        if let Some(window) = web_sys::window()
            && let Ok(Some(storage)) = window.local_storage()
        {
            return Some(f(&storage));
        }
        None
    }
    #[cfg(not(target_family = "wasm"))]
    {
        None
    }
}

/// `window.localStorage` behind the deck's `StorageBackend` seam. Quota
/// and availability failures surface as errors the persistence layer
/// absorbs.
#[derive(Default)]
pub struct LocalStorage;

impl StorageBackend for LocalStorage {
    fn load(&self, key: &str) -> Option<String> {
        with_local_storage(|storage| storage.get_item(key).ok().flatten()).flatten()
    }

    fn store(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        match with_local_storage(|storage| {
            storage
                .set_item(key, value)
                .map_err(|e| StorageError::WriteFailed(format!("{e:?}")))
        }) {
            Some(result) => result,
            None => Err(StorageError::Unavailable),
        }
    }

    fn remove(&mut self, key: &str) {
        with_local_storage(|storage| {
            let _ = storage.remove_item(key);
        });
    }
}
