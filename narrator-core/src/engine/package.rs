use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::SynthesisError;
use crate::settings::SynthesisOptions;

/// Maps a voice's package reference to a local path.
#[async_trait]
pub trait PackageResolver: Send + Sync {
    async fn resolve(
        &self,
        package: &str,
        options: &SynthesisOptions,
    ) -> Result<PathBuf, SynthesisError>;
}

/// Looks packages up as `<packages_dir>/<package>`. Packages must already be
/// installed there.
#[derive(Debug, Default, Clone)]
pub struct DirectoryPackageResolver;

#[async_trait]
impl PackageResolver for DirectoryPackageResolver {
    async fn resolve(
        &self,
        package: &str,
        options: &SynthesisOptions,
    ) -> Result<PathBuf, SynthesisError> {
        if package.is_empty() || package.contains("..") {
            return Err(SynthesisError::configuration(format!(
                "Invalid package reference '{package}'"
            )));
        }

        let path = options.packages_dir().join(package);
        match tokio::fs::metadata(&path).await {
            Ok(_) => Ok(path),
            Err(_) => Err(SynthesisError::configuration(format!(
                "Package '{package}' is not installed at {}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_installed_packages_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("kokoro-en")).unwrap();
        let options = SynthesisOptions {
            packages_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };

        let resolver = DirectoryPackageResolver;
        let path = resolver.resolve("kokoro-en", &options).await.unwrap();
        assert_eq!(path, dir.path().join("kokoro-en"));

        let missing = resolver.resolve("vits-de", &options).await;
        assert!(matches!(missing, Err(SynthesisError::Configuration(_))));

        let escape = resolver.resolve("../etc", &options).await;
        assert!(matches!(escape, Err(SynthesisError::Configuration(_))));
    }
}
