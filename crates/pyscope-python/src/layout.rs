use std::path::{Component, Path, PathBuf};

use pyscope_tracer::filter::CodeArea;

use crate::protocol::Hello;

/// Path layout of an interpreter, used for classifying source files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterpreterLayout {
    stdlib: Vec<PathBuf>,
    site: Vec<PathBuf>,
}

impl InterpreterLayout {
    /// Creates a layout from the standard library and third-party package
    /// directories.
    pub fn new(stdlib: Vec<PathBuf>, site: Vec<PathBuf>) -> Self {
        Self { stdlib, site }
    }

    /// Returns the area the given source file belongs to.
    ///
    /// Third-party directories take precedence, as they are usually nested
    /// within the standard library directory (when not in a virtualenv).
    pub fn classify(&self, file: &Path) -> CodeArea {
        if file.as_os_str().to_string_lossy().starts_with("<frozen") {
            return CodeArea::Stdlib;
        }

        if self.site.iter().any(|dir| file.starts_with(dir)) || in_site_dir(file) {
            CodeArea::SitePackages
        } else if self.stdlib.iter().any(|dir| file.starts_with(dir)) {
            CodeArea::Stdlib
        } else {
            CodeArea::Application
        }
    }
}

impl From<&Hello> for InterpreterLayout {
    fn from(hello: &Hello) -> Self {
        Self::new(hello.stdlib.clone(), hello.site.clone())
    }
}

fn in_site_dir(file: &Path) -> bool {
    file.components().any(|c| {
        matches!(c, Component::Normal(name) if name == "site-packages" || name == "dist-packages")
    })
}
