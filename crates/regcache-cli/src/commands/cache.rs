use anyhow::{Context, Result};
use regcache_config::Config;
use regcache_storage::{ArtifactKey, ArtifactStore, FileSystemStorage, Lookup, StorageOptions};
use std::io::Write;

use crate::cli::CacheCommands;

pub async fn handle(cmd: CacheCommands, config: &Config) -> Result<()> {
    let storage = FileSystemStorage::new(StorageOptions::new(&config.storage.base_directory))?;

    match cmd {
        CacheCommands::Get {
            package,
            file,
            output,
        } => {
            let key = ArtifactKey::new(package, file);
            match storage.read_artifact(&key).await? {
                Lookup::Found(data) => match output {
                    Some(path) => {
                        tokio::fs::write(&path, &data)
                            .await
                            .with_context(|| format!("Failed to write {}", path.display()))?;
                        println!("Wrote {} ({} bytes)", path.display(), data.len());
                    }
                    None => {
                        let mut stdout = std::io::stdout().lock();
                        stdout.write_all(&data)?;
                        stdout.flush()?;
                    }
                },
                Lookup::NotFound => {
                    eprintln!("Not cached: {}", key);
                }
            }
        }
        CacheCommands::Put {
            package,
            file,
            source,
        } => {
            let key = ArtifactKey::new(package, file);
            let data = tokio::fs::read(&source)
                .await
                .with_context(|| format!("Failed to read {}", source.display()))?;
            storage.write_artifact(&key, &data).await?;
            println!(
                "Cached {} under {} ({} bytes)",
                key,
                storage.base_directory().display(),
                data.len()
            );
        }
    }

    Ok(())
}
