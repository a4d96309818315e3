//! Default administrator and demo catalog for `init-db`

use log::{debug, info};
use sqlx::sqlite::SqlitePool;

use crate::catalog::{self, NewPlaylist, NewTrack};
use crate::error::{AppError, Result};
use crate::queries::tracks;
use crate::upload::UploadPipeline;
use crate::users::{self, NewUser, Role};

pub const DEFAULT_ADMIN_EMAIL: &str = "admin@ie30012.edu.pe";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

const DEMO_TEACHER_PASSWORD: &str = "docente123";
const DEMO_STUDENT_PASSWORD: &str = "estudiante123";

/// Stand-in content for demo audio files; streams as bytes, does not decode
pub const PLACEHOLDER_AUDIO: &[u8] = b"PLACEHOLDER_AUDIO_FILE";

/// One demo plays row is recorded per this many plays of the advertised count
const PLAY_SCALE: i64 = 10;

struct DemoTeacher {
    email: &'static str,
    first_name: &'static str,
    last_name: &'static str,
    specialty: &'static str,
}

struct DemoStudent {
    email: &'static str,
    first_name: &'static str,
    last_name: &'static str,
    grade: &'static str,
    section: &'static str,
}

struct DemoTrack {
    title: &'static str,
    artist: &'static str,
    album: &'static str,
    genre: &'static str,
    year: i32,
    duration_secs: i64,
    audio_file: &'static str,
    description: &'static str,
    subject: &'static str,
    target_grade: Option<&'static str>,
    uploader: &'static str,
    plays: i64,
}

struct DemoPlaylist {
    name: &'static str,
    description: &'static str,
    is_public: bool,
    owner: &'static str,
    tracks: &'static [&'static str],
}

const TEACHERS: &[DemoTeacher] = &[
    DemoTeacher {
        email: "prof.musica@ie30012.edu.pe",
        first_name: "María",
        last_name: "González Vásquez",
        specialty: "Educación Musical",
    },
    DemoTeacher {
        email: "prof.comunicacion@ie30012.edu.pe",
        first_name: "Carlos",
        last_name: "Ramírez Torres",
        specialty: "Comunicación",
    },
    DemoTeacher {
        email: "prof.matematicas@ie30012.edu.pe",
        first_name: "Ana",
        last_name: "López Mendoza",
        specialty: "Matemáticas",
    },
    DemoTeacher {
        email: "prof.ciencias@ie30012.edu.pe",
        first_name: "Roberto",
        last_name: "Flores Huamán",
        specialty: "Ciencias Naturales",
    },
    DemoTeacher {
        email: "prof.historia@ie30012.edu.pe",
        first_name: "Lucía",
        last_name: "Vargas Quispe",
        specialty: "Historia y Geografía",
    },
];

const STUDENTS: &[DemoStudent] = &[
    DemoStudent {
        email: "juan.perez@ie30012.edu.pe",
        first_name: "Juan Carlos",
        last_name: "Pérez Silva",
        grade: "1ro",
        section: "A",
    },
    DemoStudent {
        email: "maria.garcia@ie30012.edu.pe",
        first_name: "María Elena",
        last_name: "García Rojas",
        grade: "2do",
        section: "B",
    },
    DemoStudent {
        email: "luis.martinez@ie30012.edu.pe",
        first_name: "Luis Fernando",
        last_name: "Martínez Cruz",
        grade: "3ro",
        section: "A",
    },
    DemoStudent {
        email: "sofia.lopez@ie30012.edu.pe",
        first_name: "Sofía Isabel",
        last_name: "López Herrera",
        grade: "4to",
        section: "C",
    },
    DemoStudent {
        email: "diego.torres@ie30012.edu.pe",
        first_name: "Diego Alejandro",
        last_name: "Torres Mendoza",
        grade: "5to",
        section: "B",
    },
    DemoStudent {
        email: "valentina.ruiz@ie30012.edu.pe",
        first_name: "Valentina",
        last_name: "Ruiz Flores",
        grade: "1ro",
        section: "B",
    },
    DemoStudent {
        email: "sebastian.castro@ie30012.edu.pe",
        first_name: "Sebastián",
        last_name: "Castro Vega",
        grade: "2do",
        section: "A",
    },
    DemoStudent {
        email: "camila.vargas@ie30012.edu.pe",
        first_name: "Camila Andrea",
        last_name: "Vargas Soto",
        grade: "3ro",
        section: "C",
    },
];

const TRACKS: &[DemoTrack] = &[
    DemoTrack {
        title: "Las Tablas de Multiplicar",
        artist: "Coro Escolar I.E. 30012",
        album: "Matemáticas Cantadas",
        genre: "educativo",
        year: 2024,
        duration_secs: 180,
        audio_file: "tablas_multiplicar.mp3",
        description: "Canción educativa para aprender las tablas de multiplicar del 1 al 10 de manera divertida y memorable.",
        subject: "matematicas",
        target_grade: Some("2do"),
        uploader: "prof.matematicas@ie30012.edu.pe",
        plays: 150,
    },
    DemoTrack {
        title: "El Himno Nacional del Perú",
        artist: "Orquesta Sinfónica Nacional",
        album: "Símbolos Patrios",
        genre: "clasico",
        year: 2023,
        duration_secs: 240,
        audio_file: "himno_nacional.mp3",
        description: "Versión completa del Himno Nacional del Perú para ceremonias escolares y enseñanza de valores patrios.",
        subject: "historia",
        target_grade: None,
        uploader: "prof.musica@ie30012.edu.pe",
        plays: 320,
    },
    DemoTrack {
        title: "Canción del Alfabeto",
        artist: "Grupo Infantil Arco Iris",
        album: "Aprendiendo Juntos",
        genre: "infantil",
        year: 2024,
        duration_secs: 120,
        audio_file: "alfabeto.mp3",
        description: "Canción pegajosa para que los estudiantes aprendan el alfabeto español de manera entretenida.",
        subject: "comunicacion",
        target_grade: Some("1ro"),
        uploader: "prof.comunicacion@ie30012.edu.pe",
        plays: 280,
    },
    DemoTrack {
        title: "Los Estados de la Materia",
        artist: "Laboratorio Musical",
        album: "Ciencia en Canciones",
        genre: "educativo",
        year: 2024,
        duration_secs: 200,
        audio_file: "estados_materia.mp3",
        description: "Explica los tres estados de la materia con ejemplos cotidianos y una melodía fácil de recordar.",
        subject: "ciencias",
        target_grade: Some("3ro"),
        uploader: "prof.musica@ie30012.edu.pe",
        plays: 95,
    },
    DemoTrack {
        title: "Marinera Norteña",
        artist: "Conjunto Folclórico del Norte",
        album: "Danzas del Perú",
        genre: "folclore",
        year: 2023,
        duration_secs: 300,
        audio_file: "marinera_nortena.mp3",
        description: "Marinera tradicional del norte del Perú para enseñar sobre nuestro patrimonio cultural y danza típica.",
        subject: "arte",
        target_grade: Some("4to"),
        uploader: "prof.musica@ie30012.edu.pe",
        plays: 180,
    },
    DemoTrack {
        title: "Poema Cantado: Masa de César Vallejo",
        artist: "Recitadores Unidos",
        album: "Poesía Peruana en Música",
        genre: "educativo",
        year: 2024,
        duration_secs: 250,
        audio_file: "masa_vallejo.mp3",
        description: "Adaptación musical del poema \"Masa\" de César Vallejo para análisis literario y comprensión poética.",
        subject: "comunicacion",
        target_grade: Some("5to"),
        uploader: "prof.comunicacion@ie30012.edu.pe",
        plays: 65,
    },
    DemoTrack {
        title: "Geografía del Perú",
        artist: "Exploradores Musicales",
        album: "Conociendo Nuestro País",
        genre: "educativo",
        year: 2024,
        duration_secs: 220,
        audio_file: "geografia_peru.mp3",
        description: "Recorrido musical por las regiones, departamentos y principales características geográficas del Perú.",
        subject: "geografia",
        target_grade: Some("3ro"),
        uploader: "prof.musica@ie30012.edu.pe",
        plays: 120,
    },
    DemoTrack {
        title: "Ejercicios y Deportes",
        artist: "Grupo Activo",
        album: "Vida Saludable",
        genre: "infantil",
        year: 2024,
        duration_secs: 180,
        audio_file: "ejercicios_deportes.mp3",
        description: "Canción motivacional sobre la importancia del ejercicio y los deportes para una vida saludable.",
        subject: "educacion_fisica",
        target_grade: Some("2do"),
        uploader: "prof.musica@ie30012.edu.pe",
        plays: 200,
    },
];

const PLAYLISTS: &[DemoPlaylist] = &[
    DemoPlaylist {
        name: "Matemáticas Divertidas",
        description: "Colección de canciones para hacer las matemáticas más entretenidas y fáciles de recordar.",
        is_public: true,
        owner: "prof.matematicas@ie30012.edu.pe",
        tracks: &["Las Tablas de Multiplicar"],
    },
    DemoPlaylist {
        name: "Patrimonio Cultural Peruano",
        description: "Selección musical que celebra nuestra rica herencia cultural peruana.",
        is_public: true,
        owner: "prof.musica@ie30012.edu.pe",
        tracks: &["El Himno Nacional del Perú", "Marinera Norteña"],
    },
    DemoPlaylist {
        name: "Ciencias Naturales",
        description: "Canciones educativas para comprender mejor los conceptos científicos básicos.",
        is_public: true,
        owner: "prof.musica@ie30012.edu.pe",
        tracks: &["Los Estados de la Materia"],
    },
    DemoPlaylist {
        name: "Literatura en Música",
        description: "Adaptaciones musicales de grandes obras literarias peruanas.",
        is_public: true,
        owner: "prof.musica@ie30012.edu.pe",
        tracks: &["Poema Cantado: Masa de César Vallejo"],
    },
    DemoPlaylist {
        name: "Mi Playlist Personal",
        description: "Selección personal de canciones educativas favoritas.",
        is_public: false,
        owner: "prof.musica@ie30012.edu.pe",
        tracks: &["Geografía del Perú", "Ejercicios y Deportes"],
    },
];

/// What a seeding run actually created
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub admin_created: bool,
    pub users: usize,
    pub tracks: usize,
    pub playlists: usize,
    pub plays: usize,
}

/// Create the default administrator unless it already exists
pub async fn seed_admin(pool: &SqlitePool, secret: &str) -> Result<bool> {
    let created =
        users::ensure_admin(pool, secret, DEFAULT_ADMIN_EMAIL, DEFAULT_ADMIN_PASSWORD).await?;
    if created {
        info!("Created administrator account {}", DEFAULT_ADMIN_EMAIL);
    } else {
        debug!("Administrator account {} already exists", DEFAULT_ADMIN_EMAIL);
    }
    Ok(created)
}

async fn user_id_by_email(pool: &SqlitePool, email: &str) -> Result<i64> {
    users::find_by_email(pool, email)
        .await?
        .map(|u| u.id)
        .ok_or_else(|| AppError::Internal(format!("demo user {} is missing", email)))
}

async fn track_id_by_title(pool: &SqlitePool, title: &str) -> Result<Option<i64>> {
    let sql = tracks::select_id_by_title(title);
    Ok(sqlx::query_scalar(&sql).fetch_optional(pool).await?)
}

/// Insert a demo user unless the email is taken; true when inserted
async fn seed_user(pool: &SqlitePool, new_user: NewUser) -> Result<bool> {
    if users::find_by_email(pool, &new_user.email).await?.is_some() {
        return Ok(false);
    }
    users::insert_user(pool, &new_user).await?;
    Ok(true)
}

/// Load the demo teachers, students, tracks and playlists
///
/// Safe to run repeatedly: rows that already exist are left alone, so a second
/// run creates nothing. Tracks point at placeholder files written into the
/// music directory. Play history is replayed through [`catalog::record_play`]
/// so counters and events agree.
pub async fn seed_demo_data(
    pool: &SqlitePool,
    secret: &str,
    uploads: &UploadPipeline,
) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();

    let teacher_hash = users::hash_password(secret, DEMO_TEACHER_PASSWORD)?;
    for teacher in TEACHERS {
        let new_user = NewUser {
            email: teacher.email.to_string(),
            first_name: teacher.first_name.to_string(),
            last_name: teacher.last_name.to_string(),
            password_hash: teacher_hash.clone(),
            role: Role::Teacher,
            grade: None,
            section: None,
            specialty: Some(teacher.specialty.to_string()),
        };
        if seed_user(pool, new_user).await? {
            summary.users += 1;
        }
    }

    let student_hash = users::hash_password(secret, DEMO_STUDENT_PASSWORD)?;
    let mut student_ids = Vec::with_capacity(STUDENTS.len());
    for student in STUDENTS {
        let new_user = NewUser {
            email: student.email.to_string(),
            first_name: student.first_name.to_string(),
            last_name: student.last_name.to_string(),
            password_hash: student_hash.clone(),
            role: Role::Student,
            grade: Some(student.grade.to_string()),
            section: Some(student.section.to_string()),
            specialty: None,
        };
        if seed_user(pool, new_user).await? {
            summary.users += 1;
        }
        student_ids.push(user_id_by_email(pool, student.email).await?);
    }

    uploads.ensure_dirs().await?;
    let music_dir = uploads.music_dir();

    for track in TRACKS {
        let path = music_dir.join(track.audio_file);
        if !tokio::fs::try_exists(&path).await? {
            tokio::fs::write(&path, PLACEHOLDER_AUDIO).await?;
            debug!("Wrote placeholder {}", path.display());
        }

        if track_id_by_title(pool, track.title).await?.is_some() {
            continue;
        }

        let new_track = NewTrack {
            title: track.title.to_string(),
            artist: track.artist.to_string(),
            album: Some(track.album.to_string()),
            genre: Some(track.genre.to_string()),
            year: Some(track.year),
            duration_secs: Some(track.duration_secs),
            audio_file: track.audio_file.to_string(),
            cover_image: None,
            description: Some(track.description.to_string()),
            subject: Some(track.subject.to_string()),
            target_grade: track.target_grade.map(str::to_string),
            uploaded_by: user_id_by_email(pool, track.uploader).await?,
        };
        let track_id = catalog::insert_track(pool, &new_track).await?;
        summary.tracks += 1;

        for n in 0..track.plays / PLAY_SCALE {
            let listener = student_ids[n as usize % student_ids.len()];
            catalog::record_play(pool, listener, track_id).await?;
            summary.plays += 1;
        }
    }

    for playlist in PLAYLISTS {
        let owner_id = user_id_by_email(pool, playlist.owner).await?;
        let exists = catalog::user_playlists(pool, owner_id)
            .await?
            .iter()
            .any(|p| p.name == playlist.name);
        if exists {
            continue;
        }

        let created = catalog::create_playlist(
            pool,
            &NewPlaylist {
                name: playlist.name.to_string(),
                description: Some(playlist.description.to_string()),
                is_public: playlist.is_public,
                owner_id,
            },
        )
        .await?;
        for title in playlist.tracks {
            if let Some(track_id) = track_id_by_title(pool, title).await? {
                catalog::add_to_playlist(pool, created.id, track_id).await?;
            }
        }
        summary.playlists += 1;
    }

    info!(
        "Demo data: {} users, {} tracks, {} playlists, {} plays created",
        summary.users, summary.tracks, summary.playlists, summary.plays
    );
    Ok(summary)
}
