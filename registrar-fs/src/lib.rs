//! Capability-scoped filesystem helpers shared by the registrar crates.
//!
//! Source roots are opened once as [`fs_utf8::Dir`] capabilities; every
//! later access resolves relative to that root, so a source path cannot
//! escape it with `..` or absolute components.
#![forbid(unsafe_code)]

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use std::io;
use std::path::Component;
use wildmatch::WildMatch;

/// Open `path` as a directory capability using ambient authority.
pub fn open_root(path: &Utf8Path) -> io::Result<fs_utf8::Dir> {
    fs_utf8::Dir::open_ambient_dir(path, ambient_authority())
}

/// Resolve the parent directory of `path` and return it with the file name.
pub fn open_dir_and_file(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, String)> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other(format!("{path} does not name a file")))?
        .to_owned();
    let dir = fs_utf8::Dir::open_ambient_dir(parent, ambient_authority())?;
    Ok((dir, file_name))
}

/// Read a whole UTF-8 file addressed by an ambient path.
pub fn read_to_string(path: &Utf8Path) -> io::Result<String> {
    let (dir, name) = open_dir_and_file(path)?;
    dir.read_to_string(name.as_str())
}

/// Write `contents` to an ambient path, creating missing parent directories.
pub fn write_file(path: &Utf8Path, contents: impl AsRef<[u8]>) -> io::Result<()> {
    ensure_parent_dir(path)?;
    let (dir, name) = open_dir_and_file(path)?;
    dir.write(name.as_str(), contents)
}

/// Ensure the parent directory for `path` exists.
pub fn ensure_parent_dir(path: &Utf8Path) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_str().is_empty() || parent == Utf8Path::new("/") {
        return Ok(());
    }

    let (base_dir, relative) = base_dir_and_relative(parent)?;
    if relative.as_str().is_empty() {
        return Ok(());
    }
    base_dir.create_dir_all(&relative)
}

/// Split a path into an ambient base directory and the remainder below it.
pub fn base_dir_and_relative(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, Utf8PathBuf)> {
    let std_path = path.as_std_path();

    let (base, relative) = match std_path.components().next() {
        // Windows drive or UNC prefix.
        Some(Component::Prefix(prefix)) => {
            let prefix_str = prefix
                .as_os_str()
                .to_str()
                .ok_or_else(|| io::Error::other("non-UTF-8 path prefix"))?;
            let base = Utf8PathBuf::from(prefix_str).join(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_path
                .strip_prefix(base.as_std_path())
                .or_else(|_| std_path.strip_prefix(prefix.as_os_str()))
                .map_err(|_| io::Error::other("failed to strip prefix from path"))?
                .to_path_buf();
            (base, relative)
        }
        Some(Component::RootDir) => {
            let base = Utf8PathBuf::from(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_path
                .strip_prefix(base.as_std_path())
                .map_err(|_| io::Error::other("failed to strip root from absolute path"))?
                .to_path_buf();
            (base, relative)
        }
        _ => (Utf8PathBuf::from("."), std_path.to_path_buf()),
    };

    let dir = fs_utf8::Dir::open_ambient_dir(&base, ambient_authority())?;
    let relative =
        Utf8PathBuf::from_path_buf(relative).map_err(|_| io::Error::other("non-UTF-8 path"))?;

    Ok((dir, relative))
}

/// Strip leading separators so that a source path resolves under a root.
#[must_use]
pub fn root_relative(path: &str) -> &Utf8Path {
    Utf8Path::new(path.trim_start_matches(['/', '\\']))
}

/// Copy `relative` from `root` to the ambient path `dest`.
pub fn copy_from_root(root: &fs_utf8::Dir, relative: &Utf8Path, dest: &Utf8Path) -> io::Result<u64> {
    ensure_parent_dir(dest)?;
    let (dest_dir, name) = open_dir_and_file(dest)?;
    root.copy(relative, &dest_dir, name.as_str())
}

/// Whether `name` matches any of the wildcard `patterns`.
///
/// An empty pattern list matches everything.
///
/// # Examples
///
/// ```
/// use registrar_fs::matches_any;
///
/// let patterns = vec!["*.xml".to_owned()];
/// assert!(matches_any("MTD_MSIL1C.xml", &patterns));
/// assert!(!matches_any("preview.png", &patterns));
/// assert!(matches_any("anything", &[]));
/// ```
#[must_use]
pub fn matches_any(name: &str, patterns: &[String]) -> bool {
    patterns.is_empty()
        || patterns
            .iter()
            .any(|pattern| WildMatch::new(pattern).matches(name))
}

/// List entries under `relative` whose file names match `patterns`.
///
/// A file path is returned as-is when its name matches; a directory is
/// listed one level deep. Results are sorted for stable output.
pub fn list_matching(
    root: &fs_utf8::Dir,
    relative: &Utf8Path,
    patterns: &[String],
) -> io::Result<Vec<Utf8PathBuf>> {
    let target = if relative.as_str().is_empty() {
        Utf8Path::new(".")
    } else {
        relative
    };
    let metadata = root.metadata(target)?;
    if metadata.is_file() {
        let name = target.file_name().unwrap_or_default();
        return Ok(if matches_any(name, patterns) {
            vec![target.to_path_buf()]
        } else {
            Vec::new()
        });
    }

    let mut found = Vec::new();
    for entry in root.read_dir(target)? {
        let name = entry?.file_name()?;
        if matches_any(&name, patterns) {
            found.push(relative.join(name));
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn tree() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 tempdir");
        write_file(&root.join("S2A.SAFE/MTD_MSIL1C.xml"), "<product/>").expect("write product");
        write_file(&root.join("S2A.SAFE/INSPIRE.xml"), "<inspire/>").expect("write inspire");
        write_file(&root.join("S2A.SAFE/preview.png"), [0_u8, 1]).expect("write preview");
        (dir, root)
    }

    #[rstest]
    fn lists_matching_entries_sorted(tree: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = tree;
        let dir = open_root(&root).expect("open root");
        let found = list_matching(&dir, Utf8Path::new("S2A.SAFE"), &["*.xml".to_owned()])
            .expect("list");
        assert_eq!(
            found,
            vec![
                Utf8PathBuf::from("S2A.SAFE/INSPIRE.xml"),
                Utf8PathBuf::from("S2A.SAFE/MTD_MSIL1C.xml"),
            ]
        );
    }

    #[rstest]
    fn lists_single_file_when_it_matches(tree: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = tree;
        let dir = open_root(&root).expect("open root");
        let path = Utf8Path::new("S2A.SAFE/INSPIRE.xml");
        assert_eq!(
            list_matching(&dir, path, &["INSPIRE*".to_owned()]).expect("list"),
            vec![path.to_path_buf()]
        );
        assert!(
            list_matching(&dir, path, &["*.png".to_owned()])
                .expect("list")
                .is_empty()
        );
    }

    #[rstest]
    fn copies_out_of_root(tree: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = tree;
        let dir = open_root(&root).expect("open root");
        let dest = root.join("staging/nested/copy.xml");
        copy_from_root(&dir, Utf8Path::new("S2A.SAFE/INSPIRE.xml"), &dest).expect("copy");
        assert_eq!(read_to_string(&dest).expect("read copy"), "<inspire/>");
    }

    #[rstest]
    fn root_cannot_be_escaped(tree: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = tree;
        let dir = open_root(&root.join("S2A.SAFE")).expect("open root");
        assert!(dir.read_to_string("../S2A.SAFE/INSPIRE.xml").is_err());
    }

    #[rstest]
    #[case("/data/S2A.SAFE", "data/S2A.SAFE")]
    #[case("data/S2A.SAFE", "data/S2A.SAFE")]
    fn root_relative_strips_leading_separators(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(root_relative(input), Utf8Path::new(expected));
    }
}
