use duct::cmd;
use rand::distributions::{Alphanumeric, DistString};
use std::{error::Error, fs, path::Path};

pub fn get_random_id() -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), 16)
}

fn configure_identity(path: &str) -> Result<(), Box<dyn Error>> {
    cmd!("git", "config", "user.name", "Test").dir(path).read()?;
    cmd!("git", "config", "user.email", "test@example.com")
        .dir(path)
        .read()?;

    Ok(())
}

fn commit_all(path: &str, message: &str) -> Result<(), Box<dyn Error>> {
    cmd!("git", "add", "-A").dir(path).read()?;
    cmd!("git", "commit", "-m", message).dir(path).read()?;

    Ok(())
}

/// Create a bare remote at `{local}-remote` and a clone at `local` on `main` with one commit.
pub fn create_empty_repository(local: &str) -> Result<(), Box<dyn Error>> {
    let remote = format!("{local}-remote");

    // Create directory and repository in it
    fs::create_dir_all(&remote)?;
    cmd!("git", "init", "--bare").dir(&remote).read()?;
    cmd!("git", "clone", &remote, local).read()?;
    cmd!("git", "symbolic-ref", "HEAD", "refs/heads/main")
        .dir(local)
        .read()?;
    configure_identity(local)?;
    fs::write(format!("{local}/1"), "1")?;
    commit_all(local, "1")?;
    cmd!("git", "push", "origin", "main").dir(local).read()?;

    Ok(())
}

/// Commit the files in a second clone at `{local}-other` and push them to the remote.
pub fn push_from_other_repository(
    local: &str,
    files: &[(&str, &str)],
) -> Result<(), Box<dyn Error>> {
    let remote = format!("{local}-remote");
    let other = format!("{local}-other");

    if !Path::new(&other).exists() {
        cmd!("git", "clone", "-b", "main", &remote, &other).read()?;
        configure_identity(&other)?;
    }
    for (file, contents) in files {
        let path = Path::new(&other).join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
    }
    commit_all(&other, "2")?;
    cmd!("git", "push", "origin", "main").dir(&other).read()?;

    Ok(())
}

pub fn cleanup_repository(local: &str) -> Result<(), Box<dyn Error>> {
    for directory in [
        local.to_string(),
        format!("{local}-remote"),
        format!("{local}-other"),
    ] {
        if Path::new(&directory).exists() {
            fs::remove_dir_all(directory)?;
        }
    }

    Ok(())
}
