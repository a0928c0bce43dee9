use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::f32::consts::TAU;
use std::fs;
use std::path::{Path, PathBuf};

use sacred_player::catalog::Track;

const SAMPLE_RATE: u32 = 44_100;
const PULSE_HZ: f32 = 0.25;
const CLICK_EVERY_SECS: f32 = 2.0;
const CLICK_LEN_SECS: f32 = 0.01;

#[derive(Parser)]
#[command(name = "demo-catalog")]
#[command(about = "Write tone tracks and a catalog.json for trying the player offline")]
struct Args {
    /// Directory receiving the WAV files and catalog.json
    #[arg(short, long, default_value = "demo")]
    out: PathBuf,

    /// Length of each tone in seconds
    #[arg(long, default_value = "30")]
    seconds: u32,
}

struct Tone {
    id: &'static str,
    title: &'static str,
    hertz: f32,
    description: &'static str,
}

const TONES: [Tone; 3] = [
    Tone {
        id: "tone-528",
        title: "Miracle Tone",
        hertz: 528.0,
        description: "Sine tone with a slow swell",
    },
    Tone {
        id: "tone-432",
        title: "Verdi Tuning",
        hertz: 432.0,
        description: "Sine tone with a slow swell",
    },
    Tone {
        id: "tone-396",
        title: "Root Release",
        hertz: 396.0,
        description: "Sine tone with a slow swell",
    },
];

/// One mono sample: the tone under a slow amplitude pulse, with a short
/// broadband click at the start of every click period.
fn tone_sample(hertz: f32, t: f32) -> f32 {
    let pulse = 0.55 + 0.35 * (TAU * PULSE_HZ * t).sin();
    let mut sample = (TAU * hertz * t).sin() * pulse * 0.6;

    if t % CLICK_EVERY_SECS < CLICK_LEN_SECS {
        let decay = 1.0 - (t % CLICK_EVERY_SECS) / CLICK_LEN_SECS;
        sample += (TAU * 3_500.0 * t).sin().signum() * 0.3 * decay;
    }
    sample.clamp(-1.0, 1.0)
}

fn sample_count(seconds: u32) -> u64 {
    u64::from(SAMPLE_RATE) * u64::from(seconds)
}

fn write_tone(path: &Path, hertz: f32, seconds: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;

    for n in 0..sample_count(seconds) {
        let t = (n as f64 / f64::from(SAMPLE_RATE)) as f32;
        writer.write_sample((tone_sample(hertz, t) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

fn catalog_rows(files: &[(usize, PathBuf)], seconds: u32) -> Vec<Track> {
    let mut rows: Vec<Track> = files
        .iter()
        .map(|(index, path)| {
            let tone = &TONES[*index];
            Track {
                id: tone.id.to_string(),
                title: tone.title.to_string(),
                frequency: Some(format!("{}Hz", tone.hertz)),
                duration: Some(format!("{}:{:02}", seconds / 60, seconds % 60)),
                file_url: Some(path.display().to_string()),
                description: Some(tone.description.to_string()),
            }
        })
        .collect();

    rows.push(Track {
        id: "slot-upcoming".to_string(),
        title: "Upcoming".to_string(),
        frequency: Some("639Hz".to_string()),
        duration: None,
        file_url: None,
        description: Some("Reserved slot".to_string()),
    });
    rows
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    fs::create_dir_all(&args.out).with_context(|| format!("creating {}", args.out.display()))?;
    let out = fs::canonicalize(&args.out)?;
    info!("Writing demo catalog to {}", out.display());

    let mut files = Vec::new();
    for (index, tone) in TONES.iter().enumerate() {
        let path = out.join(format!("{}.wav", tone.id));
        write_tone(&path, tone.hertz, args.seconds.max(1))?;
        info!("Wrote {} ({}Hz)", path.display(), tone.hertz);
        files.push((index, path));
    }

    let rows = catalog_rows(&files, args.seconds.max(1));
    let catalog_path = out.join("catalog.json");
    fs::write(&catalog_path, serde_json::to_string_pretty(&rows)?)?;
    info!("Wrote {} with {} rows", catalog_path.display(), rows.len());

    println!("sacred-player --catalog {}", catalog_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sacred_player::catalog::playable_tracks;

    #[test]
    fn samples_stay_in_range() {
        for n in 0..SAMPLE_RATE * 3 {
            let t = n as f32 / SAMPLE_RATE as f32;
            let sample = tone_sample(528.0, t);
            assert!((-1.0..=1.0).contains(&sample));
        }
    }

    #[test]
    fn clicks_land_at_period_starts() {
        let quiet = tone_sample(0.0, 1.0);
        let click = tone_sample(0.0, CLICK_EVERY_SECS + 0.001);
        assert_eq!(quiet, 0.0);
        assert!(click.abs() > 0.1);
    }

    #[test]
    fn long_tones_do_not_overflow_the_sample_count() {
        assert_eq!(sample_count(30), 1_323_000);
        assert_eq!(sample_count(u32::MAX), 44_100 * u64::from(u32::MAX));
        assert!(sample_count(100_000) > u64::from(u32::MAX));
    }

    #[test]
    fn catalog_keeps_placeholder_unplayable() {
        let files = vec![(0, PathBuf::from("/tmp/a.wav")), (1, PathBuf::from("/tmp/b.wav"))];
        let rows = catalog_rows(&files, 90);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].frequency.as_deref(), Some("528Hz"));
        assert_eq!(rows[1].duration.as_deref(), Some("1:30"));
        assert_eq!(playable_tracks(rows).len(), 2);
    }
}
