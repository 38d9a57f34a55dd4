use anyhow::Context;
use filejump_backend::{DirEntry, FileJumpFs, Fs, ObjectInfo, OpenOption};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::Command;

pub(crate) async fn run(fs: &FileJumpFs, command: Command) -> anyhow::Result<()> {
    match command {
        Command::List { dir } => list(fs, &dir).await,
        Command::Stat { path } => stat(fs, &path).await,
        Command::Mkdir { dir } => fs
            .mkdir(&dir)
            .await
            .with_context(|| format!("mkdir {dir:?} failed")),
        Command::Rmdir { dir } => fs
            .rmdir(&dir)
            .await
            .with_context(|| format!("rmdir {dir:?} failed")),
        Command::Purge { dir } => fs
            .purge(&dir)
            .await
            .with_context(|| format!("purge {dir:?} failed")),
        Command::Cat {
            path,
            offset,
            count,
        } => cat(fs, &path, offset, count).await,
        Command::Put { local, remote } => put(fs, &local, &remote).await,
        Command::Remove { path } => {
            let object = fs
                .new_object(&path)
                .await
                .with_context(|| format!("{path:?} not found"))?;
            object
                .remove()
                .await
                .with_context(|| format!("failed to delete {path:?}"))
        }
    }
}

async fn list(fs: &FileJumpFs, dir: &str) -> anyhow::Result<()> {
    let entries = fs
        .list(dir)
        .await
        .with_context(|| format!("failed to list {dir:?}"))?;
    for entry in entries {
        match entry {
            DirEntry::Directory(directory) => {
                println!(
                    "{:>12} {} {}/",
                    "-",
                    format_time(directory.mod_time)?,
                    directory.remote
                );
            }
            DirEntry::Object(object) => {
                println!(
                    "{:>12} {} {}",
                    object.size().await?,
                    format_time(object.mod_time().await?)?,
                    object.remote()
                );
            }
        }
    }
    Ok(())
}

async fn stat(fs: &FileJumpFs, path: &str) -> anyhow::Result<()> {
    let object = fs
        .new_object(path)
        .await
        .with_context(|| format!("{path:?} not found"))?;
    println!("path:     {}", object.remote());
    println!("id:       {}", object.id().unwrap_or("-"));
    println!("size:     {}", object.size().await?);
    println!("modified: {}", format_time(object.mod_time().await?)?);
    println!("mime:     {}", object.mime_type().unwrap_or("-"));
    Ok(())
}

async fn cat(fs: &FileJumpFs, path: &str, offset: u64, count: Option<u64>) -> anyhow::Result<()> {
    let object = fs
        .new_object(path)
        .await
        .with_context(|| format!("{path:?} not found"))?;
    let options = match count {
        Some(0) => return Ok(()),
        Some(count) => vec![OpenOption::range(offset, Some(offset.saturating_add(count - 1)))],
        None if offset > 0 => vec![OpenOption::Seek(offset)],
        None => Vec::new(),
    };
    let mut reader = object
        .open(&options)
        .await
        .with_context(|| format!("failed to open {path:?}"))?;
    let mut stdout = tokio::io::stdout();
    tokio::io::copy(&mut reader, &mut stdout)
        .await
        .with_context(|| format!("failed to read {path:?}"))?;
    tokio::io::AsyncWriteExt::flush(&mut stdout).await?;
    Ok(())
}

async fn put(fs: &FileJumpFs, local: &str, remote: &str) -> anyhow::Result<()> {
    let file = tokio::fs::File::open(local)
        .await
        .with_context(|| format!("failed to open {local:?}"))?;
    let metadata = file.metadata().await?;
    let mod_time = metadata
        .modified()
        .map(OffsetDateTime::from)
        .unwrap_or_else(|_| OffsetDateTime::now_utc());
    let src = ObjectInfo::new(remote, Some(metadata.len()), mod_time);
    let object = fs
        .put(Box::new(file), &src)
        .await
        .with_context(|| format!("failed to upload {local:?} to {remote:?}"))?;
    tracing::info!(remote = object.remote(), id = object.id(), "uploaded");
    Ok(())
}

fn format_time(at: OffsetDateTime) -> anyhow::Result<String> {
    Ok(at.format(&Rfc3339)?)
}
