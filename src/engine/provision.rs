//! Source provisioning: where a unit's source text comes from.
//!
//! Inline mode hands over one blob. Project mode reads a `*.msproj` manifest
//! and every `<Compile Include="..."/>` file it lists, in document order.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::EngineError;

/// Manifest file extension, without the dot.
pub const MANIFEST_EXTENSION: &str = "msproj";

/// Origin name reported for inline source.
pub const INLINE_ORIGIN: &str = "<inline>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Name used in diagnostics.
    pub origin: String,
    pub text: String,
}

/// The ordered files of one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceUnit {
    pub files: Vec<SourceFile>,
}

impl SourceUnit {
    pub fn texts(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.text.as_str()).collect()
    }

    pub fn origin(&self, file: u16) -> &str {
        self.files
            .get(usize::from(file))
            .map_or(INLINE_ORIGIN, |f| f.origin.as_str())
    }

    pub fn text(&self, file: u16) -> &str {
        self.files.get(usize::from(file)).map_or("", |f| f.text.as_str())
    }
}

/// A strategy for producing the source unit of one run.
pub trait Provision {
    fn provision(&self) -> Result<SourceUnit, EngineError>;
}

/// Raw text supplied by the caller. No filesystem access.
#[derive(Debug, Clone)]
pub struct InlineSource {
    code: String,
}

impl InlineSource {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

impl Provision for InlineSource {
    fn provision(&self) -> Result<SourceUnit, EngineError> {
        Ok(SourceUnit {
            files: vec![SourceFile {
                origin: INLINE_ORIGIN.to_string(),
                text: self.code.clone(),
            }],
        })
    }
}

/// A project directory holding a manifest.
#[derive(Debug, Clone)]
pub struct ProjectSource {
    dir: PathBuf,
}

impl ProjectSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Provision for ProjectSource {
    fn provision(&self) -> Result<SourceUnit, EngineError> {
        let manifest = find_manifest(&self.dir)?;
        let text = fs::read_to_string(&manifest).map_err(|source| EngineError::Io {
            path: manifest.clone(),
            source,
        })?;
        let includes = parse_manifest(&manifest, &text)?;
        log::debug!(
            "manifest {} lists {} source file(s)",
            manifest.display(),
            includes.len()
        );

        let mut files = Vec::with_capacity(includes.len());
        for include in includes {
            let path = self.dir.join(&include);
            if !path.is_file() {
                return Err(EngineError::SourceFileMissing { path });
            }
            let text = fs::read_to_string(&path).map_err(|source| EngineError::Io {
                path: path.clone(),
                source,
            })?;
            files.push(SourceFile {
                origin: include,
                text,
            });
        }
        Ok(SourceUnit { files })
    }
}

/// Find the project's manifest. With several, the first by file name wins.
pub fn find_manifest(dir: &Path) -> Result<PathBuf, EngineError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(EngineError::NoManifestFound {
                dir: dir.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(EngineError::Io {
                path: dir.to_path_buf(),
                source,
            });
        }
    };

    let mut manifests: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(MANIFEST_EXTENSION))
        })
        .collect();
    manifests.sort();

    let mut iter = manifests.into_iter();
    let Some(first) = iter.next() else {
        return Err(EngineError::NoManifestFound {
            dir: dir.to_path_buf(),
        });
    };
    for ignored in iter {
        log::warn!(
            "several manifests in {}; using {} and ignoring {}",
            dir.display(),
            first.display(),
            ignored.display()
        );
    }
    Ok(first)
}

/// Extract `<Compile Include="..."/>` paths in document order. Backslashes
/// are normalized to `/`.
pub fn parse_manifest(path: &Path, text: &str) -> Result<Vec<String>, EngineError> {
    let invalid = |message: String| EngineError::ManifestInvalid {
        path: path.to_path_buf(),
        message,
    };

    let mut xml = Reader::from_str(text);
    xml.config_mut().trim_text(true);

    let mut includes = Vec::new();
    let mut saw_element = false;
    loop {
        match xml.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Start(ref e) | Event::Empty(ref e)) => {
                saw_element = true;
                if e.local_name().as_ref() != b"Compile" {
                    continue;
                }
                for attr in e.attributes().flatten() {
                    if attr.key.local_name().as_ref() != b"Include" {
                        continue;
                    }
                    let value = attr
                        .unescape_value()
                        .map_err(|e| invalid(format!("bad Include attribute: {e}")))?;
                    let value = value.trim().replace('\\', "/");
                    if value.is_empty() {
                        return Err(invalid("empty Include attribute".to_string()));
                    }
                    includes.push(value);
                }
            }
            Err(e) => {
                return Err(invalid(format!(
                    "XML error at position {}: {e}",
                    xml.error_position()
                )));
            }
            _ => {}
        }
    }

    if !saw_element {
        return Err(invalid("no XML elements found".to_string()));
    }
    Ok(includes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, text: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, text).unwrap();
    }

    #[test]
    fn inline_is_one_file() {
        let unit = InlineSource::new("1;").provision().unwrap();
        assert_eq!(unit.files.len(), 1);
        assert_eq!(unit.origin(0), "<inline>");
        assert_eq!(unit.texts(), vec!["1;"]);
    }

    #[test]
    fn manifest_includes_in_document_order() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<Project xmlns="http://schemas.microsoft.com/developer/msbuild/2003">
  <ItemGroup>
    <Compile Include="b.ms" />
    <Compile Include="sub\a.ms"></Compile>
    <None Include="readme.txt" />
  </ItemGroup>
</Project>"#;
        let includes = parse_manifest(Path::new("p.msproj"), xml).unwrap();
        assert_eq!(includes, vec!["b.ms", "sub/a.ms"]);
    }

    #[test]
    fn malformed_manifest_is_invalid() {
        let err = parse_manifest(Path::new("p.msproj"), "<Project><Compile Include=\"a.ms\"></Nope></Project>")
            .unwrap_err();
        assert!(matches!(err, EngineError::ManifestInvalid { .. }));
        let err = parse_manifest(Path::new("p.msproj"), "not xml at all").unwrap_err();
        assert!(matches!(err, EngineError::ManifestInvalid { .. }));
    }

    #[test]
    fn no_manifest_found() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.ms", "1;");
        let err = ProjectSource::new(dir.path()).provision().unwrap_err();
        assert!(matches!(err, EngineError::NoManifestFound { .. }));
    }

    #[test]
    fn missing_directory_is_no_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_manifest(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, EngineError::NoManifestFound { .. }));
    }

    #[test]
    fn first_manifest_by_name_wins() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "zeta.msproj", "<Project/>");
        write(dir.path(), "alpha.msproj", "<Project/>");
        let found = find_manifest(dir.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "alpha.msproj");
    }

    #[test]
    fn missing_source_file() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "app.msproj",
            r#"<Project><Compile Include="a.ms"/><Compile Include="b.ms"/></Project>"#,
        );
        write(dir.path(), "a.ms", "1;");
        let err = ProjectSource::new(dir.path()).provision().unwrap_err();
        let EngineError::SourceFileMissing { path } = err else {
            panic!("expected SourceFileMissing");
        };
        assert!(path.ends_with("b.ms"));
    }

    #[test]
    fn project_files_keep_manifest_order() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "app.msproj",
            r#"<Project><Compile Include="src\second.ms"/><Compile Include="first.ms"/></Project>"#,
        );
        write(dir.path(), "first.ms", "// first");
        write(dir.path(), "src/second.ms", "// second");
        let unit = ProjectSource::new(dir.path()).provision().unwrap();
        let origins: Vec<_> = unit.files.iter().map(|f| f.origin.as_str()).collect();
        assert_eq!(origins, vec!["src/second.ms", "first.ms"]);
        assert_eq!(unit.text(1), "// first");
    }
}
