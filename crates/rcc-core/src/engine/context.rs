//! Build-context packing.
//!
//! The context directory is sent to the daemon as a tar archive, the way the
//! Docker CLI does it: symlinks are stored as links, never followed, and
//! paths matched by `<context>/.dockerignore` are left out. The build file
//! and `.dockerignore` itself are always sent.

use std::fs;
use std::io;
use std::path::Path;

use glob::{MatchOptions, Pattern};
use tracing::warn;

pub const DOCKERIGNORE: &str = ".dockerignore";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug)]
struct IgnoreRule {
    pattern: Pattern,
    exclude: bool,
}

impl IgnoreRule {
    /// A pattern naming a directory covers everything below it.
    fn matches(&self, path: &str) -> bool {
        let mut prefix = path;
        loop {
            if self.pattern.matches_with(prefix, MATCH_OPTIONS) {
                return true;
            }
            match prefix.rfind('/') {
                Some(idx) => prefix = &prefix[..idx],
                None => return false,
            }
        }
    }
}

/// Parsed `.dockerignore`. Later rules win; `!pattern` re-includes.
#[derive(Debug, Default)]
pub struct IgnoreRules {
    rules: Vec<IgnoreRule>,
}

impl IgnoreRules {
    pub fn parse(contents: &str) -> Self {
        let rules = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (exclude, raw) = match line.strip_prefix('!') {
                    Some(rest) => (false, rest.trim()),
                    None => (true, line),
                };
                let cleaned = clean_path(raw);
                if cleaned.is_empty() {
                    return None;
                }
                match Pattern::new(&cleaned) {
                    Ok(pattern) => Some(IgnoreRule { pattern, exclude }),
                    Err(err) => {
                        warn!(pattern = %raw, "Skipping invalid .dockerignore pattern: {}", err);
                        None
                    }
                }
            })
            .collect();
        Self { rules }
    }

    /// Rules from `<context>/.dockerignore`; none when the file is absent.
    pub fn load(context: &Path) -> io::Result<Self> {
        match fs::read_to_string(context.join(DOCKERIGNORE)) {
            Ok(contents) => Ok(Self::parse(&contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err),
        }
    }

    /// `path` is relative to the context root with `/` separators.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.rules
            .iter()
            .filter(|rule| rule.matches(path))
            .last()
            .map(|rule| rule.exclude)
            .unwrap_or(false)
    }

    fn has_exceptions(&self) -> bool {
        self.rules.iter().any(|rule| !rule.exclude)
    }
}

/// Tar the context directory into memory.
pub fn pack_context(dir: &Path, dockerfile: &str) -> io::Result<Vec<u8>> {
    let rules = IgnoreRules::load(dir)?;
    let keep = [clean_path(dockerfile), DOCKERIGNORE.to_string()];

    let mut archive = tar::Builder::new(Vec::new());
    archive.follow_symlinks(false);
    append_tree(&mut archive, dir, "", &rules, &keep)?;
    archive.into_inner()
}

fn append_tree(
    archive: &mut tar::Builder<Vec<u8>>,
    root: &Path,
    rel: &str,
    rules: &IgnoreRules,
    keep: &[String],
) -> io::Result<()> {
    let dir = if rel.is_empty() {
        root.to_path_buf()
    } else {
        root.join(rel)
    };
    let mut entries = fs::read_dir(&dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = if rel.is_empty() {
            name
        } else {
            format!("{rel}/{name}")
        };
        let file_type = entry.file_type()?;
        let excluded = !keep.contains(&path) && rules.is_excluded(&path);

        if file_type.is_dir() {
            if excluded {
                let below = format!("{path}/");
                let needed =
                    rules.has_exceptions() || keep.iter().any(|k| k.starts_with(&below));
                if !needed {
                    continue;
                }
            } else {
                archive.append_dir(&path, entry.path())?;
            }
            append_tree(archive, root, &path, rules, keep)?;
        } else if !excluded {
            archive.append_path_with_name(entry.path(), &path)?;
        }
    }
    Ok(())
}

fn clean_path(raw: &str) -> String {
    raw.split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn entries(packed: &[u8]) -> Vec<(String, tar::EntryType)> {
        let mut archive = tar::Archive::new(packed);
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                let name = e.path().unwrap().to_string_lossy().into_owned();
                (name, e.header().entry_type())
            })
            .collect()
    }

    fn names(packed: &[u8]) -> Vec<String> {
        entries(packed).into_iter().map(|(n, _)| n).collect()
    }

    fn write(root: &Path, rel: &str, contents: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_packs_dockerfile() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "rosdep.Dockerfile", "FROM ubuntu:bionic\n");

        let packed = pack_context(dir.path(), "rosdep.Dockerfile").unwrap();
        assert_eq!(names(&packed), vec!["rosdep.Dockerfile"]);
    }

    #[test]
    fn test_missing_dir_is_error() {
        assert!(pack_context(Path::new("/nonexistent/rcc-docker-dir"), "Dockerfile").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_stored_as_link() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "sysroot/Dockerfile_workspace", "FROM scratch\n");
        fs::create_dir_all(dir.path().join("ros_ws/build")).unwrap();
        std::os::unix::fs::symlink(
            "/nonexistent/target",
            dir.path().join("ros_ws/build/compile_commands.json"),
        )
        .unwrap();

        let packed = pack_context(dir.path(), "sysroot/Dockerfile_workspace").unwrap();

        let link = entries(&packed)
            .into_iter()
            .find(|(name, _)| name == "ros_ws/build/compile_commands.json");
        assert_eq!(
            link,
            Some((
                "ros_ws/build/compile_commands.json".to_string(),
                tar::EntryType::Symlink
            ))
        );
    }

    #[test]
    fn test_dockerignore_excludes_directory_contents() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), DOCKERIGNORE, "# colcon output\nros_ws/build\n");
        write(dir.path(), "ros_ws/build/huge.o", "\0\0\0");
        write(dir.path(), "ros_ws/src/pkg/package.xml", "<package/>");
        write(dir.path(), "sysroot/Dockerfile_workspace", "FROM scratch\n");

        let packed = pack_context(dir.path(), "sysroot/Dockerfile_workspace").unwrap();
        let names = names(&packed);

        assert!(!names.iter().any(|n| n.starts_with("ros_ws/build")));
        assert!(names.contains(&"ros_ws/src/pkg/package.xml".to_string()));
        assert!(names.contains(&"sysroot/Dockerfile_workspace".to_string()));
        assert!(names.contains(&DOCKERIGNORE.to_string()));
    }

    #[test]
    fn test_dockerfile_sent_even_when_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), DOCKERIGNORE, "sysroot\n");
        write(dir.path(), "sysroot/Dockerfile_workspace", "FROM scratch\n");
        write(dir.path(), "sysroot/user-custom-setup", "#!/bin/bash\n");

        let packed = pack_context(dir.path(), "sysroot/Dockerfile_workspace").unwrap();
        let names = names(&packed);

        assert!(names.contains(&"sysroot/Dockerfile_workspace".to_string()));
        assert!(!names.contains(&"sysroot/user-custom-setup".to_string()));
    }

    #[test]
    fn test_ignore_rules() {
        let rules = IgnoreRules::parse("*.o\n/ros_ws/log/\n**/*.pyc\nros_ws/install\n!ros_ws/install/setup.bash\n");

        assert!(rules.is_excluded("main.o"));
        assert!(!rules.is_excluded("ros_ws/main.o"));
        assert!(rules.is_excluded("ros_ws/log/latest"));
        assert!(rules.is_excluded("ros_ws/src/pkg/__pycache__/mod.pyc"));
        assert!(rules.is_excluded("ros_ws/install/lib/libfoo.so"));
        assert!(!rules.is_excluded("ros_ws/install/setup.bash"));
        assert!(!rules.is_excluded("ros_ws/src/pkg/package.xml"));
    }

    #[test]
    fn test_exception_inside_excluded_directory_is_packed() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), DOCKERIGNORE, "ros_ws/install\n!ros_ws/install/setup.bash\n");
        write(dir.path(), "ros_ws/install/setup.bash", "# setup\n");
        write(dir.path(), "ros_ws/install/lib/libfoo.so", "\0");
        write(dir.path(), "Dockerfile", "FROM scratch\n");

        let packed = pack_context(dir.path(), "Dockerfile").unwrap();
        let names = names(&packed);

        assert!(names.contains(&"ros_ws/install/setup.bash".to_string()));
        assert!(!names.contains(&"ros_ws/install/lib/libfoo.so".to_string()));
    }
}
