use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::{config::MAPPING_KEY, error::BridgeError, mapping::PadMapping};

/// Durable slot holding the calibration result, read once at startup by every screen
pub trait MappingStore {
    /// Returns `None` when nothing was ever saved
    fn load(&self) -> Result<Option<PadMapping>, BridgeError>;

    fn save(&self, mapping: &PadMapping) -> Result<(), BridgeError>;

    fn reset(&self) -> Result<(), BridgeError> {
        self.save(&PadMapping::identity())
    }
}

impl<T: MappingStore + ?Sized> MappingStore for &T {
    fn load(&self) -> Result<Option<PadMapping>, BridgeError> {
        (**self).load()
    }

    fn save(&self, mapping: &PadMapping) -> Result<(), BridgeError> {
        (**self).save(mapping)
    }
}

/// Key-value store backed by one JSON file per key inside a directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        JsonFileStore {
            path: dir.as_ref().join(format!("{}.json", MAPPING_KEY)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MappingStore for JsonFileStore {
    fn load(&self) -> Result<Option<PadMapping>, BridgeError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let mapping: PadMapping = serde_json::from_str(&contents)?;

        Ok(Some(mapping))
    }

    fn save(&self, mapping: &PadMapping) -> Result<(), BridgeError> {
        if !mapping.is_permutation() {
            return Err(BridgeError::InvalidMapping(format!(
                "refusing to save {:?}",
                mapping
            )));
        }

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        // Write then rename so a reader never sees half a file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(mapping)?)?;
        fs::rename(&tmp, &self.path)?;

        log::info!("Saved pad mapping to {}", self.path.display());

        Ok(())
    }
}

/// Loads the stored mapping, falling back to identity when it is absent or unusable
pub fn load_or_identity(store: &impl MappingStore) -> PadMapping {
    match store.load() {
        Ok(Some(mapping)) if mapping.is_permutation() => {
            log::info!("Loaded pad mapping {:?}", mapping);
            mapping
        }
        Ok(Some(mapping)) => {
            log::warn!("Stored pad mapping {:?} is not a permutation, using identity", mapping);
            PadMapping::identity()
        }
        Ok(None) => {
            log::info!("No stored pad mapping, using identity");
            PadMapping::identity()
        }
        Err(err) => {
            log::warn!("Failed to load pad mapping, using identity: {}", err);
            PadMapping::identity()
        }
    }
}

#[cfg(test)]
pub mod memory {
    use std::cell::RefCell;

    use super::*;

    #[derive(Debug, Default)]
    pub struct MemoryStore {
        pub slot: RefCell<Option<PadMapping>>,
    }

    impl MappingStore for MemoryStore {
        fn load(&self) -> Result<Option<PadMapping>, BridgeError> {
            Ok(*self.slot.borrow())
        }

        fn save(&self, mapping: &PadMapping) -> Result<(), BridgeError> {
            *self.slot.borrow_mut() = Some(*mapping);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();

        std::env::temp_dir().join(format!("matbridge-{}-{}-{}", name, std::process::id(), nanos))
    }

    #[test]
    fn missing_file_loads_as_none() {
        let store = JsonFileStore::new(temp_dir("missing"));

        assert!(store.load().unwrap().is_none());
        assert_eq!(load_or_identity(&store), PadMapping::identity());
    }

    #[test]
    fn save_then_load() {
        let dir = temp_dir("save");
        let store = JsonFileStore::new(&dir);

        let mut mapping = PadMapping::unset();
        mapping.assign(4, 0);
        let mapping = mapping.finalize();

        store.save(&mapping).unwrap();

        assert_eq!(store.load().unwrap(), Some(mapping));
        assert_eq!(store.path().file_name().unwrap(), "inputMapping.json");

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn reset_writes_identity_array() {
        let dir = temp_dir("reset");
        let store = JsonFileStore::new(&dir);

        store.reset().unwrap();

        assert_eq!(fs::read_to_string(store.path()).unwrap(), "[0,1,2,3,4,5,6,7,8]");

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn refuses_to_save_partial_mapping() {
        let store = JsonFileStore::new(temp_dir("partial"));

        assert!(matches!(
            store.save(&PadMapping::unset()),
            Err(BridgeError::InvalidMapping(_))
        ));
        assert!(!store.path().exists());
    }

    #[test]
    fn corrupt_or_duplicate_mapping_falls_back_to_identity() {
        let dir = temp_dir("corrupt");
        let store = JsonFileStore::new(&dir);
        fs::create_dir_all(&dir).unwrap();

        fs::write(store.path(), "not json").unwrap();
        assert!(store.load().is_err());
        assert_eq!(load_or_identity(&store), PadMapping::identity());

        fs::write(store.path(), "[0,0,2,3,4,5,6,7,8]").unwrap();
        assert_eq!(load_or_identity(&store), PadMapping::identity());

        fs::remove_dir_all(dir).ok();
    }
}
