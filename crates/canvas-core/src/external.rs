//! Trait boundaries for collaborators the core depends on but does not
//! implement (spec.md §1, §6): settings, clipboard, file picker.

use speedynote_canvas_render::Pixmap;

pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

pub trait Clipboard: Send + Sync {
    fn read_image(&self) -> Option<Pixmap>;
    fn write_image(&self, pixmap: &Pixmap);
}

pub trait FilePicker: Send + Sync {
    fn open_image(&self) -> Option<std::path::PathBuf>;
    fn open_pdf(&self) -> Option<std::path::PathBuf>;
    fn open_bundle_dir(&self) -> Option<std::path::PathBuf>;
}
