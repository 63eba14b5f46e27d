//! Directives of functions declared outside the analyzed unit
//!
//! When a callee's declaration is not part of the unit, its source file is
//! parsed on demand and the attribute directives of its declarations are
//! cached by file path. The cache is shared by all function analyses.

use fxhash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use super::parse::{parse_directive, DirectiveKind};
use crate::error::AnalysisError;

/// Attribute directives of one declaration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Attributes {
    pub pure: bool,
    pub immutable_return: bool,
}

/// Declarations of one file, keyed by receiver base name and function name
pub type FileAttributes = FxHashMap<(Option<String>, String), Attributes>;

#[derive(Debug)]
pub struct ExternalDirectives {
    tag: String,
    cache: RwLock<FxHashMap<PathBuf, Arc<FileAttributes>>>,
}

impl ExternalDirectives {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            cache: RwLock::new(FxHashMap::default()),
        }
    }

    /// Parse files ahead of the analysis. Unreadable files are fatal;
    /// files that do not parse contribute no directives.
    pub fn preload<'a>(&self, paths: impl IntoIterator<Item = &'a Path>) -> Result<(), AnalysisError> {
        for path in paths {
            if self.is_cached(path) {
                continue;
            }
            let attributes = self.load(path)?;
            self.insert(path, attributes);
        }
        Ok(())
    }

    /// Attributes of `receiver.name` declared in `path`
    pub fn lookup(&self, path: &Path, receiver: Option<&str>, name: &str) -> Attributes {
        let file = match self.cached(path) {
            Some(file) => file,
            None => {
                let attributes = match self.load(path) {
                    Ok(attributes) => attributes,
                    Err(err) => {
                        log::warn!("{}", err);
                        FileAttributes::default()
                    }
                };
                self.insert(path, attributes)
            }
        };
        file.get(&(receiver.map(str::to_string), name.to_string()))
            .copied()
            .unwrap_or_default()
    }

    pub fn cached_files(&self) -> usize {
        self.cache.read().map(|cache| cache.len()).unwrap_or(0)
    }

    fn is_cached(&self, path: &Path) -> bool {
        self.cached(path).is_some()
    }

    fn cached(&self, path: &Path) -> Option<Arc<FileAttributes>> {
        self.cache.read().ok()?.get(path).cloned()
    }

    fn insert(&self, path: &Path, attributes: FileAttributes) -> Arc<FileAttributes> {
        let attributes = Arc::new(attributes);
        if let Ok(mut cache) = self.cache.write() {
            // Another analysis may have loaded it meanwhile
            return cache
                .entry(path.to_path_buf())
                .or_insert(attributes)
                .clone();
        }
        attributes
    }

    fn load(&self, path: &Path) -> Result<FileAttributes, AnalysisError> {
        let text = std::fs::read_to_string(path).map_err(|source| AnalysisError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("parsing {} for directives", path.display());
        Ok(self.scan(&path.display().to_string(), &text))
    }

    /// Attribute directives in the doc comments of a file's declarations
    pub fn scan(&self, name: &str, text: &str) -> FileAttributes {
        let file = match parser::parse_go_file(name, text) {
            Ok(file) => file,
            Err(err) => {
                log::warn!("ignoring directives of unparsable file {}", err);
                return FileAttributes::default();
            }
        };

        let mut out = FileAttributes::default();
        for func in file.funcs() {
            let Some(doc) = &func.doc else {
                continue;
            };
            let mut attributes = Attributes::default();
            for kind in doc.comments.iter().filter_map(|c| parse_directive(&self.tag, c)).flatten() {
                match kind {
                    DirectiveKind::Pure => attributes.pure = true,
                    DirectiveKind::ImmutableReturn => attributes.immutable_return = true,
                    DirectiveKind::Ignore => {}
                }
            }
            if attributes != Attributes::default() {
                let receiver = func.receiver_base_name().map(str::to_string);
                out.insert((receiver, func.name.name.clone()), attributes);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELPERS: &str = r#"package helpers

import "gorm.io/gorm"

//chainlint:pure
func Scoped(db *gorm.DB) *gorm.DB {
	return db
}

//chainlint:immutable-return
func (r *Repo[T]) Fresh() *gorm.DB {
	return r.db.Session(&gorm.Session{})
}

func Plain(db *gorm.DB) {}
"#;

    #[test]
    fn test_scan_collects_attributes() {
        let ext = ExternalDirectives::new("chainlint");
        let attrs = ext.scan("helpers.go", HELPERS);
        assert_eq!(
            attrs.get(&(None, "Scoped".to_string())),
            Some(&Attributes { pure: true, immutable_return: false })
        );
        assert_eq!(
            attrs.get(&(Some("Repo".to_string()), "Fresh".to_string())),
            Some(&Attributes { pure: false, immutable_return: true })
        );
        assert!(attrs.get(&(None, "Plain".to_string())).is_none());
    }

    #[test]
    fn test_unparsable_file_has_no_directives() {
        let ext = ExternalDirectives::new("chainlint");
        assert!(ext.scan("broken.go", "package p\nfunc (").is_empty());
    }

    #[test]
    fn test_missing_file_is_fatal_on_preload() {
        let ext = ExternalDirectives::new("chainlint");
        let missing = Path::new("/nonexistent/chainlint/helpers.go");
        let err = ext.preload([missing]).unwrap_err();
        assert!(matches!(err, AnalysisError::Io { .. }));
        // A lookup degrades to "no directives"
        assert_eq!(ext.lookup(missing, None, "Scoped"), Attributes::default());
    }

    #[test]
    fn test_preload_and_lookup() {
        let dir = std::env::temp_dir().join(format!("chainlint-ext-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("helpers.go");
        std::fs::write(&path, HELPERS).unwrap();

        let ext = ExternalDirectives::new("chainlint");
        ext.preload([path.as_path()]).unwrap();
        assert_eq!(ext.cached_files(), 1);
        assert!(ext.lookup(&path, None, "Scoped").pure);
        assert!(ext.lookup(&path, Some("Repo"), "Fresh").immutable_return);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
