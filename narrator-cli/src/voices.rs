use anyhow::Result;
use clap::Args;

use narrator_core::{SynthesisOptions, Synthesizer, VoiceGender};

#[derive(Args, Debug)]
pub struct VoicesArgs {
    /// Engine to list; inferred from the language when absent
    #[arg(long)]
    engine: Option<String>,

    #[arg(long)]
    language: Option<String>,

    #[arg(long)]
    gender: Option<VoiceGender>,

    /// Voice name pattern
    #[arg(long)]
    name: Option<String>,
}

pub async fn run(args: VoicesArgs, options: SynthesisOptions) -> Result<()> {
    let options = SynthesisOptions {
        engine: args.engine.or(options.engine),
        language: args.language,
        voice_gender: args.gender,
        voice: args.name,
        ..options
    };

    let voices = Synthesizer::default().list_voices(&options).await?;
    if voices.is_empty() {
        println!("No matching voices");
        return Ok(());
    }

    let width = voices.iter().map(|v| v.name.len()).max().unwrap_or(0);
    for voice in voices {
        println!(
            "{:width$}  {:7}  {}",
            voice.name,
            voice.gender.to_string(),
            voice.languages.join(", "),
        );
    }
    Ok(())
}
