use anyhow::{bail, Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Read;
use std::path::PathBuf;
use tracing::{info, warn};

use narrator_core::audio::wav::write_wav_file;
use narrator_core::pipeline::event_channel;
use narrator_core::text::split_paragraphs;
use narrator_core::timeline::word_count;
use narrator_core::{CancellationToken, SynthesisEvent, SynthesisOptions, Synthesizer, VoiceGender};

#[derive(Args, Debug)]
pub struct SpeakArgs {
    /// Text to speak. Read from --file or stdin when absent
    text: Option<String>,

    /// Read the text from a file
    #[arg(long, short, value_name = "PATH", conflicts_with = "text")]
    file: Option<PathBuf>,

    #[arg(long)]
    engine: Option<String>,

    /// Voice name pattern, e.g. "jenny" or "en-US-Jenny*"
    #[arg(long)]
    voice: Option<String>,

    /// Language code such as en or en-GB; detected when absent
    #[arg(long)]
    language: Option<String>,

    #[arg(long)]
    gender: Option<VoiceGender>,

    #[arg(long)]
    speed: Option<f64>,

    #[arg(long)]
    pitch: Option<f64>,

    /// Treat the input as SSML markup
    #[arg(long)]
    ssml: bool,

    /// Send each paragraph to the engine whole
    #[arg(long)]
    no_split: bool,

    #[arg(long, short, value_name = "PATH", default_value = "narration.wav")]
    output: PathBuf,

    /// Also write the word timeline as JSON
    #[arg(long, value_name = "PATH")]
    timeline: Option<PathBuf>,
}

impl SpeakArgs {
    fn apply(&self, options: &mut SynthesisOptions) {
        if self.engine.is_some() {
            options.engine = self.engine.clone();
        }
        if self.voice.is_some() {
            options.voice = self.voice.clone();
        }
        if self.language.is_some() {
            options.language = self.language.clone();
        }
        if self.gender.is_some() {
            options.voice_gender = self.gender;
        }
        if let Some(speed) = self.speed {
            options.speed = speed;
        }
        if let Some(pitch) = self.pitch {
            options.pitch = pitch;
        }
        if self.ssml {
            options.ssml = true;
        }
        if self.no_split {
            options.split_to_sentences = false;
        }
    }

    fn read_text(&self) -> Result<String> {
        if let Some(text) = &self.text {
            return Ok(text.clone());
        }
        if let Some(path) = &self.file {
            return std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()));
        }
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read text from stdin")?;
        Ok(text)
    }
}

pub async fn run(args: SpeakArgs, mut options: SynthesisOptions) -> Result<()> {
    args.apply(&mut options);
    if options.speed <= 0.0 || options.pitch <= 0.0 {
        bail!("--speed and --pitch must be positive");
    }

    let text = args.read_text()?;
    let segments = if options.ssml {
        vec![text]
    } else {
        split_paragraphs(&text)
    };
    info!(segments = segments.len(), ?options.engine, "Speak command");

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.child();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling synthesis");
            on_interrupt.cancel();
        }
    });

    let progress = ProgressBar::new(segments.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let synthesizer = Synthesizer::default();
    let (events, mut received) = event_channel();
    let run = async {
        let result = synthesizer
            .synthesize_segments(&segments, options, &cancel, Some(&events))
            .await;
        drop(events);
        result
    };
    let report = async {
        while let Some(event) = received.recv().await {
            match event {
                SynthesisEvent::Sentence(sentence) => {
                    progress.set_message(sentence.text);
                    progress.tick();
                }
                SynthesisEvent::Segment(_) => progress.inc(1),
            }
        }
    };
    let (result, ()) = tokio::join!(run, report);
    progress.finish_and_clear();
    let result = result?;

    write_wav_file(&result.audio, &args.output)?;
    if let Some(path) = &args.timeline {
        let json = serde_json::to_string_pretty(&result.timeline)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write timeline to {}", path.display()))?;
    }

    println!(
        "Wrote {:.2}s of audio ({} words) to {} using {} / {}",
        result.audio.duration(),
        word_count(&result.timeline),
        args.output.display(),
        result.engine.as_deref().unwrap_or("-"),
        result.voice.as_ref().map(|v| v.name.as_str()).unwrap_or("-"),
    );
    Ok(())
}
