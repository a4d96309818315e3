use aula_audio::catalog;
use aula_audio::config::AppConfig;
use aula_audio::db;
use aula_audio::seed;
use aula_audio::serve;
use aula_audio::upload::UploadPipeline;
use aula_audio::users;
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "School audio library: upload, browse and play tracks")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the web application
    Serve {
        /// Path to config file (TOML format); environment variables override it
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Create the database schema and the administrator account
    InitDb {
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Also load demo teachers, students, tracks and playlists
        #[arg(long)]
        demo: bool,
    },
    /// Print catalog statistics
    Info {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let rt = tokio::runtime::Runtime::new()?;

    match args.command {
        Command::Serve { config } => {
            let config = AppConfig::load(config.as_deref())?;
            rt.block_on(serve::run_server(config))
        }
        Command::InitDb { config, demo } => {
            let config = AppConfig::load(config.as_deref())?;
            rt.block_on(init_db(config, demo))
        }
        Command::Info { config } => {
            let config = AppConfig::load(config.as_deref())?;
            rt.block_on(info(config))
        }
    }
}

async fn open_and_migrate(config: &AppConfig) -> Result<SqlitePool, String> {
    let pool = db::open_database(&config.database_url)
        .await
        .map_err(|e| format!("Failed to open database {}: {}", config.database_url, e))?;
    db::init_database_schema(&pool)
        .await
        .map_err(|e| format!("Failed to initialize database schema: {}", e))?;
    Ok(pool)
}

async fn init_db(config: AppConfig, demo: bool) -> Result<(), Box<dyn std::error::Error>> {
    let pool = open_and_migrate(&config).await?;
    println!("Database schema ready: {}", config.database_url);

    if seed::seed_admin(&pool, &config.secret_key).await? {
        println!(
            "Administrator: {} / {}",
            seed::DEFAULT_ADMIN_EMAIL,
            seed::DEFAULT_ADMIN_PASSWORD
        );
    } else {
        println!("Administrator {} already exists", seed::DEFAULT_ADMIN_EMAIL);
    }

    if demo {
        let uploads = UploadPipeline::new(
            config.upload_dir.clone(),
            config.audio_limit(),
            config.image_limit(),
        );
        let summary = seed::seed_demo_data(&pool, &config.secret_key, &uploads).await?;
        println!(
            "Demo data: {} users, {} tracks, {} playlists, {} plays",
            summary.users, summary.tracks, summary.playlists, summary.plays
        );
        println!("  Teacher: prof.musica@ie30012.edu.pe / docente123");
        println!("  Student: juan.perez@ie30012.edu.pe / estudiante123");
    }

    pool.close().await;
    Ok(())
}

async fn info(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let pool = open_and_migrate(&config).await?;

    let stats = catalog::dashboard_stats(&pool).await?;
    println!("Database: {}", config.database_url);
    println!("Users: {}", users::count_all(&pool).await?);
    println!("  Teachers: {}", stats.teachers);
    println!("  Students: {}", stats.students);
    println!("Tracks: {}", stats.tracks);

    let popular = catalog::popular_tracks(&pool, 3).await?;
    if !popular.is_empty() {
        println!("Most played:");
        for track in popular {
            println!(
                "  {} - {} ({} plays)",
                track.title, track.artist, track.play_count
            );
        }
    }

    pool.close().await;
    Ok(())
}
