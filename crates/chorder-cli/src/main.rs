//! chorder: command-line front end for chord progressions
//!
//! Reads exported progression documents, voices chords, exports MIDI,
//! renders WAV previews, drives the playback scheduler and talks to the
//! pitch-shift backend.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chorder_core::{
    export_json, import_json_with_tempo, step_duration, validate_tempo, ChordSymbol, PlaybackPlan, Progression, RowId,
};
use chorder_services::{
    export_row, write_wav, BackendClient, FileStore, PlaybackEvent, ProgressionStore, RenderConfig,
    RequestStatus, Scheduler, TracingEngine,
};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{config_path, load_config, save_config, AppConfig};

/// Chorder - chord progression toolkit
#[derive(Parser)]
#[command(name = "chorder")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: <config_dir>/chorder/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the notes of a chord label
    Notes {
        label: String,
        #[arg(long, default_value_t = 4, allow_negative_numbers = true)]
        octave: i32,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        transpose: i32,
    },

    /// Export one row of a progression document as a MIDI file
    Midi {
        document: PathBuf,
        /// Row id (default: the document's current row)
        #[arg(long)]
        row: Option<u64>,
        /// Output path (default: <track name>.mid)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render one row to a WAV file
    Render {
        document: PathBuf,
        #[arg(long)]
        row: Option<u64>,
        #[arg(long)]
        bpm: Option<u32>,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        transpose: i32,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Play one row through the scheduler, logging each entry
    Play {
        document: PathBuf,
        #[arg(long)]
        row: Option<u64>,
        /// Entry index to start from
        #[arg(long, default_value_t = 0)]
        from: usize,
        #[arg(long)]
        bpm: Option<u32>,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        transpose: i32,
    },

    /// Save, load or delete progressions in the local store
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },

    /// Ask the backend for a pitch-shifted WAV
    PitchShift {
        /// Source identifier understood by the backend (e.g. a video URL)
        source: String,
        #[arg(long, allow_negative_numbers = true)]
        semitones: i32,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print the effective configuration
    Config {
        /// Write the effective configuration back to the config file
        #[arg(long)]
        write: bool,
    },
}

#[derive(Subcommand)]
enum StoreAction {
    Save { key: String, document: PathBuf },
    Load {
        key: String,
        /// Write the document here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    Delete { key: String },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("chorder=info")),
        )
        .init();

    let cli = Cli::parse();
    let path = cli.config.unwrap_or_else(config_path);
    let config = load_config(&path);

    match cli.command {
        Commands::Notes { label, octave, transpose } => {
            let chord = ChordSymbol::parse(&label)?;
            println!("{}", chord.to_note_set(octave, transpose));
        }
        Commands::Midi { document, row, output } => {
            let progression = read_document(&document, &config)?;
            let row_id = pick_row(&progression, row)?;
            let row = progression.get_row(row_id).context("row vanished")?;
            let file = export_row(row, progression.tempo())?;
            let output = output.unwrap_or_else(|| PathBuf::from(file.file_name()));
            std::fs::write(&output, &file.bytes)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("{}", output.display());
        }
        Commands::Render { document, row, bpm, transpose, output } => {
            let progression = read_document(&document, &config)?;
            let plan = build_plan(&progression, row, bpm, transpose, &config)?;
            let render = RenderConfig {
                hush_before: Duration::from_millis(config.playback.hush_before_ms),
                ..RenderConfig::default()
            };
            write_wav(&output, &plan, &render)?;
            println!("{}", output.display());
        }
        Commands::Play { document, row, from, bpm, transpose } => {
            let progression = read_document(&document, &config)?;
            let plan = build_plan(&progression, row, bpm, transpose, &config)?;
            play(plan, from, &config)?;
        }
        Commands::Store { action } => run_store(action, &config)?,
        Commands::PitchShift { source, semitones, output } => {
            pitch_shift(&source, semitones, &output, &config)?
        }
        Commands::Config { write } => {
            if write {
                save_config(&path, &config)?;
            }
            println!("# {}", path.display());
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

/// Documents without a usable tempo take the configured one
fn read_document(path: &Path, config: &AppConfig) -> Result<Progression> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(import_json_with_tempo(&text, config.playback.tempo)?)
}

/// Requested row, else the current row, else the first row
fn pick_row(progression: &Progression, requested: Option<u64>) -> Result<RowId> {
    if let Some(id) = requested {
        let id = RowId(id);
        if progression.get_row(id).is_none() {
            bail!("no row {id} in document");
        }
        return Ok(id);
    }
    progression
        .current_row()
        .or_else(|| progression.rows().first().map(|r| r.id))
        .context("document has no rows")
}

/// Plan for a row; entries without a repeat count use the configured default
fn build_plan(
    progression: &Progression,
    row: Option<u64>,
    bpm: Option<u32>,
    transpose: i32,
    config: &AppConfig,
) -> Result<PlaybackPlan> {
    let tempo = bpm.unwrap_or_else(|| {
        let own = progression.tempo();
        if validate_tempo(own).is_ok() { own } else { config.playback.tempo }
    });
    validate_tempo(tempo)?;
    let progression = progression.set_tempo(tempo);
    let row_id = pick_row(&progression, row)?;

    let mut plan = PlaybackPlan::from_row(&progression, row_id, transpose)?;
    let tempo = plan.tempo;
    for step in &mut plan.steps {
        let unset = progression
            .find_entry(step.entry_id)
            .is_some_and(|e| matches!(e.repeat_count, None | Some(0)));
        if unset {
            step.duration = step_duration(tempo, Some(config.playback.default_repeat));
        }
    }
    Ok(plan)
}

fn play(plan: PlaybackPlan, from: usize, config: &AppConfig) -> Result<()> {
    let scheduler = Scheduler::new(Arc::new(TracingEngine), config.playback.scheduler());
    let events = scheduler.events();
    let total = plan.duration_from(from);
    info!(seconds = total.as_secs_f32(), "Playing");

    scheduler.play(plan, from)?;
    while let Ok(event) = events.recv() {
        match event {
            PlaybackEvent::EntryStarted { index, label, .. } => println!("{index}: {label}"),
            PlaybackEvent::EntryFailed { index, label, message } => {
                println!("{index}: {label} (skipped: {message})")
            }
            PlaybackEvent::Completed | PlaybackEvent::Stopped => break,
            PlaybackEvent::Started { .. } | PlaybackEvent::Hush { .. } => {}
        }
    }
    scheduler.wait();
    Ok(())
}

fn run_store(action: StoreAction, config: &AppConfig) -> Result<()> {
    let backend = FileStore::new(config.storage.resolved_dir());
    let store = ProgressionStore::with_namespace(backend, config.storage.namespace.clone());

    match action {
        StoreAction::Save { key, document } => {
            let progression = read_document(&document, config)?;
            store.save(&key, &progression)?;
            println!("saved '{key}' in {}", store.backend().dir().display());
        }
        StoreAction::Load { key, output } => {
            let Some(progression) = store.load(&key)? else {
                bail!("nothing saved under '{key}'");
            };
            let text = export_json(&progression)?;
            match output {
                Some(path) => std::fs::write(&path, text)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => println!("{text}"),
            }
        }
        StoreAction::Delete { key } => {
            store.delete(&key)?;
            println!("deleted '{key}'");
        }
    }
    Ok(())
}

fn pitch_shift(source: &str, semitones: i32, output: &Path, config: &AppConfig) -> Result<()> {
    let client = BackendClient::new(
        config.backend.base_url.clone(),
        Duration::from_secs(config.backend.timeout_secs),
    );
    let mut pending = client.spawn_pitch_shift(source, semitones);
    let started = Instant::now();
    let mut polls = 0u32;
    while pending.is_loading() {
        std::thread::sleep(Duration::from_millis(250));
        polls += 1;
        if polls % 20 == 0 {
            info!(elapsed = started.elapsed().as_secs(), "Waiting for backend");
        }
    }

    match pending.wait() {
        RequestStatus::Finished(Ok(bytes)) => {
            std::fs::write(output, &bytes)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("{}", output.display());
            Ok(())
        }
        RequestStatus::Finished(Err(e)) => Err(e.into()),
        RequestStatus::Cancelled | RequestStatus::Loading => bail!("request did not finish"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorder_core::{EntryContent, EntryKind};

    fn document() -> Progression {
        let p = Progression::default();
        let chords = p.rows()[0].id;
        let p = p.add_row(EntryKind::Chord);
        let other = p.rows()[0].id;
        let p = p
            .add_entry(chords, "C", EntryContent::chord(ChordSymbol::parse("C").unwrap(), 4))
            .unwrap()
            .add_entry(other, "G", EntryContent::chord(ChordSymbol::parse("G").unwrap(), 4))
            .unwrap();
        let g = p.get_row(other).unwrap().entries[0].id;
        p.set_repeat_count(other, g, Some(2))
    }

    #[test]
    fn test_pick_row() {
        let p = document();
        let current = p.current_row().unwrap();
        assert_eq!(pick_row(&p, None).unwrap(), current);
        assert_eq!(pick_row(&p, Some(p.rows()[0].id.0)).unwrap(), p.rows()[0].id);
        assert!(pick_row(&p, Some(999)).is_err());

        let unselected = p.delete_row(current);
        assert_eq!(pick_row(&unselected, None).unwrap(), unselected.rows()[0].id);
    }

    #[test]
    fn test_build_plan_uses_default_repeat() {
        let p = document();
        let mut config = AppConfig::default();
        config.playback.default_repeat = 1;

        // current row holds C without a repeat count: one bar at 120 BPM
        let plan = build_plan(&p, None, None, 0, &config).unwrap();
        assert_eq!(plan.steps[0].duration, Duration::from_secs(2));

        // G keeps its own two bars
        let plan = build_plan(&p, Some(p.rows()[0].id.0), Some(240), 0, &config).unwrap();
        assert_eq!(plan.steps[0].duration, Duration::from_secs(2));

        assert!(build_plan(&p, None, Some(301), 0, &config).is_err());

        // no usable document tempo: the configured one applies, --bpm still wins
        config.playback.tempo = 60;
        let untimed = p.set_tempo(0);
        let plan = build_plan(&untimed, None, None, 0, &config).unwrap();
        assert_eq!(plan.tempo, 60);
        assert_eq!(plan.steps[0].duration, Duration::from_secs(4));
        assert_eq!(build_plan(&untimed, None, Some(240), 0, &config).unwrap().tempo, 240);
        assert_eq!(build_plan(&p, None, None, 0, &config).unwrap().tempo, 120);
    }

    #[test]
    fn test_read_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, export_json(&document()).unwrap()).unwrap();
        assert_eq!(read_document(&path, &AppConfig::default()).unwrap().rows(), document().rows());
        assert!(read_document(&dir.path().join("missing.json"), &AppConfig::default()).is_err());

        let untimed = dir.path().join("untimed.json");
        std::fs::write(&untimed, r#"{ "rows": { "1": { "entries": [] } } }"#).unwrap();
        let mut config = AppConfig::default();
        config.playback.tempo = 75;
        assert_eq!(read_document(&untimed, &config).unwrap().tempo(), 75);
    }
}
