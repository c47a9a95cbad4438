use std::collections::BTreeSet;
use std::path::PathBuf;

/// Area of the host runtime a piece of code lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeArea {
    /// Standard library of the interpreter.
    Stdlib,

    /// Third-party packages (`site-packages`, `dist-packages`).
    SitePackages,

    /// Anything else (the traced application itself).
    Application,
}

/// Static metadata of a code location, as reported by the host runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodeLocation {
    /// Dotted module path (e.g., `foo.bar`).
    pub module: String,

    /// Source file.
    pub file: PathBuf,

    /// Area the source file belongs to.
    pub area: CodeArea,
}

/// Filter configuration error.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterConfigError {
    /// An included package name is not a dotted identifier.
    #[error("invalid package name: {0:?}")]
    InvalidPackage(String),
}

/// Configuration of the [FilterPolicy].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    include_stdlib: bool,
    include_site_packages: bool,
    include_packages: BTreeSet<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            include_stdlib: false,
            include_site_packages: true,
            include_packages: BTreeSet::new(),
        }
    }
}

impl FilterConfig {
    /// Creates a filter configuration, validating the package names.
    pub fn new<I, S>(
        include_stdlib: bool,
        include_site_packages: bool,
        include_packages: I,
    ) -> Result<Self, FilterConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let include_packages = include_packages
            .into_iter()
            .map(Into::into)
            .map(|name| {
                if is_package_name(&name) {
                    Ok(name)
                } else {
                    Err(FilterConfigError::InvalidPackage(name))
                }
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            include_stdlib,
            include_site_packages,
            include_packages,
        })
    }

    /// Whether standard library code is traced.
    pub const fn include_stdlib(&self) -> bool {
        self.include_stdlib
    }

    /// Whether third-party package code is traced.
    pub const fn include_site_packages(&self) -> bool {
        self.include_site_packages
    }

    /// Packages that are always traced.
    pub const fn include_packages(&self) -> &BTreeSet<String> {
        &self.include_packages
    }
}

/// Decides whether a call frame is traced, from its static location.
///
/// Precedence:
/// 1. module in an explicitly included package
/// 2. standard library, if enabled
/// 3. third-party packages, if enabled
/// 4. application code, if no package was explicitly included
#[derive(Debug, Clone, Default)]
pub struct FilterPolicy {
    config: FilterConfig,
}

impl FilterPolicy {
    /// Creates a filter policy from its configuration.
    pub const fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration of this policy.
    pub const fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Returns whether code at the given location is traced.
    pub fn should_trace(&self, location: &CodeLocation) -> bool {
        if self.is_included_package(&location.module) {
            return true;
        }

        match location.area {
            CodeArea::Stdlib => self.config.include_stdlib,
            CodeArea::SitePackages => self.config.include_site_packages,
            CodeArea::Application => self.config.include_packages.is_empty(),
        }
    }

    fn is_included_package(&self, module: &str) -> bool {
        self.config.include_packages.iter().any(|package| {
            module
                .strip_prefix(package.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
        })
    }
}

fn is_package_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c == '_' || c.is_alphabetic())
                && chars.all(|c| c == '_' || c.is_alphanumeric())
        })
}
