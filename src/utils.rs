use std::{io, path::PathBuf};

use tokio::fs;

/// Recursively copies a directory tree, overwriting existing files.
///
/// Used when an instance's launch core changes and the new core's file tree
/// has to land in the instance directory. Iterative so it stays a plain
/// `async fn`.
pub async fn copy_dir_all<S, D>(src: S, dst: D) -> io::Result<()>
where
    S: Into<PathBuf>,
    D: Into<PathBuf>,
{
    let mut pending = vec![(src.into(), dst.into())];

    while let Some((src, dst)) = pending.pop() {
        fs::create_dir_all(&dst).await?;

        let mut entries = fs::read_dir(&src).await?;
        while let Some(entry) = entries.next_entry().await? {
            let target = dst.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                pending.push((entry.path(), target));
            } else {
                fs::copy(entry.path(), target).await?;
            }
        }
    }

    Ok(())
}
