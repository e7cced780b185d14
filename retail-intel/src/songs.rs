//! retail-intel-songs - add and list entries in the song catalog
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/retail-intel/songs.db (~/.local/share/retail-intel/songs.db)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use retail_intel_core::{Config, Song, SongDatabase, SongStore};

#[derive(Parser)]
#[command(name = "retail-intel-songs")]
#[command(about = "Manage the song catalog")]
#[command(version)]
struct Args {
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add a song entry
    Add {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        genre: String,
        #[arg(long, default_value = "")]
        performer: String,
        #[arg(long, default_value = "")]
        writer: String,
        #[arg(long, default_value = "")]
        release_date: String,
        #[arg(long, default_value = "")]
        lyrics: String,
        #[arg(long, default_value = "")]
        rating: String,
        #[arg(long, default_value = "")]
        url: String,
    },

    /// List all song entries
    List,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard = if args.verbose {
        Some(
            retail_intel_core::logging::init(&config, true)
                .context("failed to initialize logging")?,
        )
    } else {
        None
    };

    let db_path = Config::database_path();
    let db = SongDatabase::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    db.migrate().context("failed to run database migrations")?;

    match args.command {
        Command::Add {
            title,
            genre,
            performer,
            writer,
            release_date,
            lyrics,
            rating,
            url,
        } => {
            let song = Song {
                title,
                genre,
                performer,
                writer,
                release_date,
                lyrics,
                rating,
                url,
            };
            cmd_add(&db, &song)
        }
        Command::List => cmd_list(&db),
    }
}

fn cmd_add(store: &impl SongStore, song: &Song) -> Result<()> {
    store.insert(song).context("failed to add song")?;
    println!("Added \"{}\"", song.title);
    Ok(())
}

fn cell(text: &str, width: usize) -> String {
    let mut out: String = text.chars().take(width).collect();
    if text.chars().count() > width {
        out.pop();
        out.push('~');
    }
    format!("{:<width$}", out, width = width)
}

fn cmd_list(store: &impl SongStore) -> Result<()> {
    let songs = store.select().context("failed to list songs")?;

    if songs.is_empty() {
        println!("No songs in the catalog.");
        return Ok(());
    }

    println!(
        "{} {} {} {} {} {}",
        cell("Title", 24),
        cell("Genre", 10),
        cell("Performer", 18),
        cell("Writer", 18),
        cell("Released", 10),
        cell("Rating", 6),
    );
    println!("{}", "-".repeat(91));
    for song in &songs {
        println!(
            "{} {} {} {} {} {}",
            cell(&song.title, 24),
            cell(&song.genre, 10),
            cell(&song.performer, 18),
            cell(&song.writer, 18),
            cell(&song.release_date, 10),
            cell(&song.rating, 6),
        );
    }
    println!("\n{} song(s)", songs.len());

    Ok(())
}
