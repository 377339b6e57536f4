use std::path::Path;

use log::info;

/// Receives progress notifications while the scene is assembled.
/// Each method is called at most once per successfully loaded file and never for an empty path.
pub trait LoadObserver {
    fn model_loaded(&self, _path: &Path) {}

    fn texture_loaded(&self, _path: &Path) {}
}

impl LoadObserver for () {}

/// Reports every finished load through the `log` facade.
pub struct LogObserver;

impl LoadObserver for LogObserver {
    fn model_loaded(&self, path: &Path) {
        info!("loaded model {}", path.display());
    }

    fn texture_loaded(&self, path: &Path) {
        info!("loaded texture {}", path.display());
    }
}

pub(crate) fn notify_model_loaded(observer: &dyn LoadObserver, path: &Path) {
    if !path.as_os_str().is_empty() {
        observer.model_loaded(path);
    }
}

pub(crate) fn notify_texture_loaded(observer: &dyn LoadObserver, path: &Path) {
    if !path.as_os_str().is_empty() {
        observer.texture_loaded(path);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::path::PathBuf;

    use super::*;

    #[derive(Default)]
    pub struct RecordingObserver {
        pub models: RefCell<Vec<PathBuf>>,
        pub textures: RefCell<Vec<PathBuf>>,
    }

    impl LoadObserver for RecordingObserver {
        fn model_loaded(&self, path: &Path) {
            self.models.borrow_mut().push(path.to_path_buf());
        }

        fn texture_loaded(&self, path: &Path) {
            self.textures.borrow_mut().push(path.to_path_buf());
        }
    }

    #[test]
    fn empty_paths_are_never_reported() {
        let observer = RecordingObserver::default();
        notify_model_loaded(&observer, Path::new(""));
        notify_texture_loaded(&observer, Path::new(""));
        notify_texture_loaded(&observer, Path::new("albedo.png"));

        assert!(observer.models.borrow().is_empty());
        assert_eq!(*observer.textures.borrow(), vec![PathBuf::from("albedo.png")]);
    }
}
