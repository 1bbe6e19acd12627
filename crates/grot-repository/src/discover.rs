//! Repository discovery: walking up from a directory to find the git
//! dir, handling worktree `.git` files and bare layouts.

use std::path::{Path, PathBuf};

use crate::RepoError;

/// The outcome of discovery, before the repository is opened.
#[derive(Debug)]
pub struct DiscoveredRepo {
    pub git_dir: PathBuf,
    pub work_tree: Option<PathBuf>,
}

/// Does this directory look like a git dir (HEAD plus objects/ and
/// refs/)?
pub fn is_git_dir(path: &Path) -> bool {
    path.join("HEAD").is_file()
        && path.join("objects").is_dir()
        && path.join("refs").is_dir()
}

/// Walk up from `start` until a repository is found.
pub fn discover_git_dir(start: &Path) -> Result<DiscoveredRepo, RepoError> {
    let start = std::fs::canonicalize(start)
        .map_err(|_| RepoError::NotFound(start.to_path_buf()))?;

    let mut current = start.clone();
    loop {
        let dot_git = current.join(".git");
        if dot_git.is_dir() {
            return Ok(DiscoveredRepo {
                git_dir: dot_git,
                work_tree: Some(current),
            });
        }
        if dot_git.is_file() {
            let target = parse_gitdir_file(&dot_git)?;
            let target = if target.is_absolute() {
                target
            } else {
                current.join(target)
            };
            return Ok(DiscoveredRepo {
                git_dir: target,
                work_tree: Some(current),
            });
        }
        if is_git_dir(&current) {
            // A bare repository.
            return Ok(DiscoveredRepo {
                git_dir: current,
                work_tree: None,
            });
        }
        match current.parent() {
            Some(parent) if parent != current => current = parent.to_path_buf(),
            _ => return Err(RepoError::NotFound(start)),
        }
    }
}

/// Open a path already known to be a git dir.
pub fn open_git_dir(git_dir: &Path) -> Result<DiscoveredRepo, RepoError> {
    if !is_git_dir(git_dir) {
        return Err(RepoError::InvalidGitDir {
            path: git_dir.to_path_buf(),
            reason: "missing HEAD, objects/, or refs/".into(),
        });
    }
    // A .git directory inside a worktree keeps that worktree attached.
    let work_tree = git_dir
        .file_name()
        .filter(|name| *name == ".git")
        .and_then(|_| git_dir.parent())
        .map(|p| p.to_path_buf());
    Ok(DiscoveredRepo {
        git_dir: git_dir.to_path_buf(),
        work_tree,
    })
}

/// Open a worktree root whose `.git` entry names the git dir.
pub fn open_work_tree(work_tree: &Path) -> Result<DiscoveredRepo, RepoError> {
    let dot_git = work_tree.join(".git");
    if dot_git.is_dir() {
        return Ok(DiscoveredRepo {
            git_dir: dot_git,
            work_tree: Some(work_tree.to_path_buf()),
        });
    }
    if dot_git.is_file() {
        let target = parse_gitdir_file(&dot_git)?;
        let target = if target.is_absolute() {
            target
        } else {
            work_tree.join(target)
        };
        return Ok(DiscoveredRepo {
            git_dir: target,
            work_tree: Some(work_tree.to_path_buf()),
        });
    }
    Err(RepoError::NotFound(work_tree.to_path_buf()))
}

/// Parse a `.git` file: `gitdir: <path>`.
fn parse_gitdir_file(path: &Path) -> Result<PathBuf, RepoError> {
    let content = std::fs::read_to_string(path).map_err(|e| RepoError::InvalidGitDir {
        path: path.to_path_buf(),
        reason: format!("cannot read .git file: {e}"),
    })?;
    let content = content.trim();
    let target = content
        .strip_prefix("gitdir: ")
        .ok_or_else(|| RepoError::InvalidGitDir {
            path: path.to_path_buf(),
            reason: format!("expected 'gitdir: <path>', got: {content}"),
        })?;
    Ok(PathBuf::from(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_git_dir(dir: &Path) {
        std::fs::create_dir_all(dir.join("objects")).unwrap();
        std::fs::create_dir_all(dir.join("refs")).unwrap();
        std::fs::write(dir.join("HEAD"), b"ref: refs/heads/main\n").unwrap();
    }

    #[test]
    fn discovers_from_nested_subdir() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("project");
        make_git_dir(&root.join(".git"));
        let deep = root.join("src/nested");
        std::fs::create_dir_all(&deep).unwrap();

        let found = discover_git_dir(&deep).unwrap();
        assert!(found.git_dir.ends_with("project/.git"));
        assert!(found.work_tree.is_some());
    }

    #[test]
    fn bare_repo_has_no_work_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let bare = tmp.path().join("repo.git");
        make_git_dir(&bare);

        let found = discover_git_dir(&bare).unwrap();
        assert_eq!(found.git_dir, std::fs::canonicalize(&bare).unwrap());
        assert!(found.work_tree.is_none());
    }

    #[test]
    fn gitdir_file_redirects() {
        let tmp = tempfile::tempdir().unwrap();
        let real = tmp.path().join("real-git");
        make_git_dir(&real);
        let worktree = tmp.path().join("wt");
        std::fs::create_dir_all(&worktree).unwrap();
        std::fs::write(
            worktree.join(".git"),
            format!("gitdir: {}\n", real.display()),
        )
        .unwrap();

        let found = open_work_tree(&worktree).unwrap();
        assert_eq!(found.git_dir, real);
    }

    #[test]
    fn missing_repo_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover_git_dir(tmp.path()),
            Err(RepoError::NotFound(_))
        ));
    }
}
