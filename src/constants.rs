use rand::Rng;

/// Expected database schema version
/// Databases created by an older build must be recreated
pub const EXPECTED_DB_VERSION: &str = "1";

/// Maximum size of an uploaded audio file (50 MiB)
pub const MAX_AUDIO_BYTES: u64 = 50 * 1024 * 1024;

/// Maximum size of an uploaded cover image (5 MiB)
pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

pub const ALLOWED_AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac", "m4a"];
pub const ALLOWED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Bounding box and JPEG quality for stored cover images
pub const COVER_MAX_WIDTH: u32 = 800;
pub const COVER_MAX_HEIGHT: u32 = 600;
pub const COVER_JPEG_QUALITY: u8 = 85;

pub const TRACKS_PER_PAGE: u64 = 20;
pub const PLAYLISTS_PER_PAGE: u64 = 12;

/// Number of entries shown in the dashboard's popular / recent lists
pub const DASHBOARD_LIST_LIMIT: u64 = 6;

/// Session lifetimes in hours
pub const SESSION_LIFETIME_HOURS: i64 = 2;
pub const REMEMBER_ME_LIFETIME_HOURS: i64 = 24 * 30;

pub const SESSION_COOKIE: &str = "session";
pub const FLASH_COOKIE: &str = "flash";

/// Subdirectories of the uploads tree
pub const MUSIC_DIR: &str = "music";
pub const COVERS_DIR: &str = "covers";
pub const AVATARS_DIR: &str = "avatars";
pub const SPOOL_DIR: &str = ".incoming";

pub const GRADES: &[&str] = &["1ro", "2do", "3ro", "4to", "5to"];
pub const SECTIONS: &[&str] = &["A", "B", "C", "D"];

pub const GENRES: &[&str] = &[
    "educativo",
    "clasico",
    "folclore",
    "infantil",
    "rock",
    "pop",
    "jazz",
    "electronico",
    "reggaeton",
    "salsa",
    "cumbia",
    "otro",
];

pub const SUBJECTS: &[&str] = &[
    "matematicas",
    "comunicacion",
    "ciencias",
    "historia",
    "geografia",
    "ingles",
    "educacion_fisica",
    "arte",
    "religion",
    "tutoria",
    "general",
];

/// Generate an opaque session token
pub fn generate_session_token() -> String {
    format!(
        "s_{}",
        rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(40)
            .map(char::from)
            .collect::<String>()
    )
}
