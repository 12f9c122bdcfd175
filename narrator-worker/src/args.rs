use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use narrator_core::SynthesisOptions;

/// Command line of the worker binary. Nothing here reads or creates the
/// settings file; defaults come from [`SynthesisOptions::default`].
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerArgs {
    pub cache_dir: Option<PathBuf>,
    pub voice_cache_ttl: Duration,
}

impl Default for WorkerArgs {
    fn default() -> Self {
        Self {
            cache_dir: None,
            voice_cache_ttl: Duration::from_secs(
                SynthesisOptions::default().voice_list_cache_ttl_secs,
            ),
        }
    }
}

impl WorkerArgs {
    /// Parses arguments after the program name. Unknown flags and bad values
    /// are logged and skipped.
    pub fn parse(args: impl IntoIterator<Item = String>) -> Self {
        let mut parsed = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            if arg == "--cache-dir" {
                match args.next() {
                    Some(dir) => parsed.cache_dir = Some(PathBuf::from(dir)),
                    None => warn!("--cache-dir requires a value"),
                }
            } else if arg == "--voice-cache-ttl" {
                match args.next().map(|v| v.parse::<u64>()) {
                    Some(Ok(secs)) => parsed.voice_cache_ttl = Duration::from_secs(secs),
                    Some(Err(e)) => warn!("Ignoring invalid --voice-cache-ttl: {e}"),
                    None => warn!("--voice-cache-ttl requires a value"),
                }
            } else {
                warn!("Ignoring unknown argument: {arg}");
            }
        }
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> WorkerArgs {
        WorkerArgs::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn defaults_without_arguments() {
        let args = parse(&[]);
        assert_eq!(args.cache_dir, None);
        assert_eq!(args.voice_cache_ttl, Duration::from_secs(60));
    }

    #[test]
    fn reads_cache_dir_and_ttl() {
        let args = parse(&["--cache-dir", "/tmp/voices", "--voice-cache-ttl", "5"]);
        assert_eq!(args.cache_dir, Some(PathBuf::from("/tmp/voices")));
        assert_eq!(args.voice_cache_ttl, Duration::from_secs(5));
    }

    #[test]
    fn skips_unknown_flags_and_bad_values() {
        let args = parse(&["--verbose", "--voice-cache-ttl", "soon", "--cache-dir", "cache"]);
        assert_eq!(args.cache_dir, Some(PathBuf::from("cache")));
        assert_eq!(args.voice_cache_ttl, Duration::from_secs(60));
    }
}
