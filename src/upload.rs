//! Upload pipeline: spool, sniff, name, normalise and commit uploaded media

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use log::{debug, error, info, warn};
use sqlx::sqlite::SqlitePool;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey};
use symphonia::core::probe::Hint;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio_stream::{Stream, StreamExt};

use crate::catalog::{self, NewTrack};
use crate::constants::{
    ALLOWED_AUDIO_EXTENSIONS, ALLOWED_IMAGE_EXTENSIONS, AVATARS_DIR, COVERS_DIR,
    COVER_JPEG_QUALITY, COVER_MAX_HEIGHT, COVER_MAX_WIDTH, GENRES, GRADES, MUSIC_DIR, SPOOL_DIR,
    SUBJECTS,
};
use crate::error::{AppError, MediaKind, UploadError};
use crate::users::User;

/// An upload copied to disk, not yet moved to its final place
///
/// The temp file is removed on drop unless persisted.
#[derive(Debug)]
pub struct SpooledUpload {
    pub file: NamedTempFile,
    pub size: u64,
    pub original_name: String,
    pub extension: String,
}

impl SpooledUpload {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Lowercased extension of a client supplied filename
pub fn file_extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

pub fn allowed_extensions(kind: MediaKind) -> &'static [&'static str] {
    match kind {
        MediaKind::Audio => ALLOWED_AUDIO_EXTENSIONS,
        MediaKind::Image => ALLOWED_IMAGE_EXTENSIONS,
    }
}

/// Check a filename against the allowlist for its kind, returning the extension
pub fn check_extension(name: &str, kind: MediaKind) -> Result<String, UploadError> {
    let extension = file_extension(name).unwrap_or_default();
    if allowed_extensions(kind).contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(UploadError::UnsupportedExtension { kind, extension })
    }
}

/// Copy a byte stream into a temp file inside `dir`
///
/// Bytes are counted as they arrive and the copy stops with `TooLarge` as
/// soon as the count passes `limit`, so an oversized body is never fully
/// buffered.
pub async fn spool_to_temp<S, E>(
    stream: S,
    original_name: &str,
    kind: MediaKind,
    limit: u64,
    dir: &Path,
) -> Result<SpooledUpload, UploadError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let extension = check_extension(original_name, kind)?;

    tokio::fs::create_dir_all(dir).await?;
    let temp = NamedTempFile::new_in(dir)?;
    let mut writer = tokio::fs::File::from_std(temp.reopen()?);

    let mut stream = std::pin::pin!(stream);
    let mut size: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| UploadError::Multipart(e.to_string()))?;
        size += chunk.len() as u64;
        if size > limit {
            debug!("Rejecting {} '{}' past {} bytes", kind.noun(), original_name, limit);
            return Err(UploadError::too_large(kind, limit));
        }
        writer.write_all(&chunk).await?;
    }
    writer.flush().await?;

    if size == 0 {
        return Err(UploadError::Empty(kind));
    }

    Ok(SpooledUpload {
        file: temp,
        size,
        original_name: original_name.to_string(),
        extension,
    })
}

/// Technical details read from an audio file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioMetadata {
    pub duration_secs: Option<i64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<usize>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

impl AudioMetadata {
    fn apply_tags(&mut self, revision: &MetadataRevision) {
        for tag in revision.tags() {
            let value = tag.value.to_string();
            if value.trim().is_empty() {
                continue;
            }
            match tag.std_key {
                Some(StandardTagKey::TrackTitle) => self.title = Some(value),
                Some(StandardTagKey::Artist) => self.artist = Some(value),
                Some(StandardTagKey::Album) => self.album = Some(value),
                _ => {}
            }
        }
    }
}

fn probe_audio_blocking(path: &Path, extension: Option<&str>) -> Result<AudioMetadata, UploadError> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let mut probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| UploadError::unrecognized(MediaKind::Audio, e))?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| UploadError::unrecognized(MediaKind::Audio, "no audio track found"))?;

    let params = &track.codec_params;
    let duration_secs = match (params.n_frames, params.time_base, params.sample_rate) {
        (Some(frames), Some(time_base), _) => Some(time_base.calc_time(frames).seconds as i64),
        (Some(frames), None, Some(rate)) if rate > 0 => Some((frames / rate as u64) as i64),
        _ => None,
    };

    let mut metadata = AudioMetadata {
        duration_secs,
        sample_rate: params.sample_rate,
        channels: params.channels.map(|c| c.count()),
        ..Default::default()
    };

    // Tags can live ahead of the container (ID3) or inside it
    if let Some(revision) = probed.metadata.get().as_ref().and_then(|m| m.current()) {
        metadata.apply_tags(revision);
    }
    if let Some(revision) = probed.format.metadata().current() {
        metadata.apply_tags(revision);
    }

    Ok(metadata)
}

/// Sniff an audio file's real format and read its metadata
/// The extension is only a hint; content that no demuxer accepts is rejected
pub async fn probe_audio(path: &Path, extension: Option<&str>) -> Result<AudioMetadata, UploadError> {
    let path = path.to_path_buf();
    let extension = extension.map(str::to_string);
    tokio::task::spawn_blocking(move || probe_audio_blocking(&path, extension.as_deref()))
        .await
        .map_err(|e| UploadError::Io(std::io::Error::other(e)))?
}

fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = pixel[3] as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        rgb.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    rgb
}

fn normalize_cover_blocking(bytes: &[u8]) -> Result<Vec<u8>, UploadError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| UploadError::unrecognized(MediaKind::Image, e))?;

    let mut rgb = flatten_onto_white(&decoded);
    if rgb.width() > COVER_MAX_WIDTH || rgb.height() > COVER_MAX_HEIGHT {
        rgb = DynamicImage::ImageRgb8(rgb)
            .resize(COVER_MAX_WIDTH, COVER_MAX_HEIGHT, FilterType::Lanczos3)
            .to_rgb8();
    }

    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, COVER_JPEG_QUALITY);
    encoder
        .encode_image(&rgb)
        .map_err(|e| UploadError::unrecognized(MediaKind::Image, e))?;
    Ok(out)
}

/// Decode a cover image and re-encode it as a bounded JPEG
///
/// Transparency is flattened onto white and images larger than the
/// bounding box are shrunk with their aspect ratio kept. Smaller images
/// are never upscaled.
pub async fn normalize_cover(bytes: Vec<u8>) -> Result<Vec<u8>, UploadError> {
    tokio::task::spawn_blocking(move || normalize_cover_blocking(&bytes))
        .await
        .map_err(|e| UploadError::Io(std::io::Error::other(e)))?
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        'Á' | 'À' | 'Ä' | 'Â' => 'A',
        'É' | 'È' | 'Ë' | 'Ê' => 'E',
        'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
        'Ó' | 'Ò' | 'Ö' | 'Ô' => 'O',
        'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
        'Ñ' => 'N',
        other => other,
    }
}

/// Reduce a client filename to a safe ASCII name
///
/// Accented Latin letters lose their accent and other non-ASCII characters
/// are dropped. Path separators become spaces, whitespace runs become `_`,
/// anything outside `[A-Za-z0-9._-]` is dropped and leading/trailing `.`/`_`
/// trimmed.
pub fn secure_filename(name: &str) -> String {
    let ascii: String = name
        .chars()
        .map(fold_accent)
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// Build a collision-resistant stored filename
///
/// With a prefix: `{prefix}_{YYYYmmdd_HHMMSS}_{8 hex}{.ext}`.
/// Without: `{YYYYmmdd_HHMMSS}_{8 hex}_{first 20 chars of name}{.ext}`.
pub fn generate_unique_filename(original: &str, prefix: Option<&str>) -> String {
    let safe = secure_filename(original);
    let (stem, ext) = match safe.rfind('.') {
        Some(idx) if idx > 0 => {
            let (stem, ext) = safe.split_at(idx);
            (stem.to_string(), ext.to_string())
        }
        // Sanitizing ate the stem and the dot; keep the client's extension
        _ => match original.rsplit_once('.').map(|(_, ext)| ext) {
            Some(ext) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
                let stem = safe.strip_suffix(ext).unwrap_or(&safe);
                (stem.to_string(), format!(".{}", ext))
            }
            _ => (safe.clone(), String::new()),
        },
    };

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let unique = uuid::Uuid::new_v4().simple().to_string();
    let unique = &unique[..8];

    match prefix.filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{}_{}_{}{}", prefix, timestamp, unique, ext),
        None => {
            let short: String = stem.chars().take(20).collect();
            format!("{}_{}_{}{}", timestamp, unique, short, ext)
        }
    }
}

/// Human readable file size, e.g. `2.5 MB`
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

/// Text fields of the upload form
#[derive(Debug, Clone, Default)]
pub struct TrackForm {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub year: String,
    pub subject: String,
    pub target_grade: String,
    pub description: String,
}

impl TrackForm {
    /// Record a multipart text field; unknown names are ignored
    pub fn set_field(&mut self, name: &str, value: String) {
        let slot = match name {
            "titulo" => &mut self.title,
            "artista" => &mut self.artist,
            "album" => &mut self.album,
            "genero" => &mut self.genre,
            "anio" => &mut self.year,
            "materia" => &mut self.subject,
            "grado_objetivo" => &mut self.target_grade,
            "descripcion" => &mut self.description,
            _ => return,
        };
        *slot = value;
    }

    /// Validate the form, falling back to the file's own tags for a blank title or artist
    pub fn to_new_track(&self, tags: &AudioMetadata, uploaded_by: i64) -> Result<NewTrack, AppError> {
        fn text(value: &str) -> Option<String> {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        }
        fn bounded(label: &str, value: &Option<String>, max: usize) -> Result<(), AppError> {
            match value {
                Some(v) if v.chars().count() > max => Err(AppError::Validation(format!(
                    "{} must be at most {} characters.",
                    label, max
                ))),
                _ => Ok(()),
            }
        }
        fn choice(label: &str, value: &Option<String>, allowed: &[&str]) -> Result<(), AppError> {
            match value {
                Some(v) if !allowed.contains(&v.as_str()) => {
                    Err(AppError::Validation(format!("Please choose a valid {}.", label)))
                }
                _ => Ok(()),
            }
        }

        let title = text(&self.title)
            .or_else(|| tags.title.clone())
            .ok_or_else(|| AppError::Validation("Title is required.".into()))?;
        let artist = text(&self.artist)
            .or_else(|| tags.artist.clone())
            .ok_or_else(|| AppError::Validation("Artist is required.".into()))?;
        let album = text(&self.album).or_else(|| tags.album.clone());
        let genre = text(&self.genre);
        let subject = text(&self.subject);
        let target_grade = text(&self.target_grade);
        let description = text(&self.description);

        bounded("Title", &Some(title.clone()), 200)?;
        bounded("Artist", &Some(artist.clone()), 200)?;
        bounded("Album", &album, 200)?;
        bounded("Description", &description, 500)?;
        choice("genre", &genre, GENRES)?;
        choice("subject", &subject, SUBJECTS)?;
        choice("grade", &target_grade, GRADES)?;

        let year = self.year.trim();
        let year = if !year.is_empty() && year.chars().all(|c| c.is_ascii_digit()) {
            year.parse().ok()
        } else {
            None
        };

        Ok(NewTrack {
            title,
            artist,
            album,
            genre,
            year,
            duration_secs: tags.duration_secs,
            audio_file: String::new(),
            cover_image: None,
            description,
            subject,
            target_grade,
            uploaded_by,
        })
    }
}

/// Outcome of a successful upload
#[derive(Debug, Clone)]
pub struct StoredTrack {
    pub track_id: i64,
    pub audio_file: String,
    pub cover_image: Option<String>,
    /// Non-fatal problems, e.g. a rejected cover
    pub warnings: Vec<String>,
}

pub fn cover_warning(err: &UploadError) -> String {
    format!("Cover image: {}. The track was uploaded without a cover.", err)
}

/// Owns the uploads tree and turns spooled files into catalog entries
#[derive(Debug, Clone)]
pub struct UploadPipeline {
    upload_dir: PathBuf,
    audio_limit: u64,
    image_limit: u64,
}

impl UploadPipeline {
    pub fn new(upload_dir: impl Into<PathBuf>, audio_limit: u64, image_limit: u64) -> Self {
        UploadPipeline {
            upload_dir: upload_dir.into(),
            audio_limit,
            image_limit,
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn music_dir(&self) -> PathBuf {
        self.upload_dir.join(MUSIC_DIR)
    }

    pub fn covers_dir(&self) -> PathBuf {
        self.upload_dir.join(COVERS_DIR)
    }

    pub fn avatars_dir(&self) -> PathBuf {
        self.upload_dir.join(AVATARS_DIR)
    }

    /// Temp files live inside the uploads tree so persisting them is a rename
    pub fn spool_dir(&self) -> PathBuf {
        self.upload_dir.join(SPOOL_DIR)
    }

    pub fn limit(&self, kind: MediaKind) -> u64 {
        match kind {
            MediaKind::Audio => self.audio_limit,
            MediaKind::Image => self.image_limit,
        }
    }

    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            self.music_dir(),
            self.covers_dir(),
            self.avatars_dir(),
            self.spool_dir(),
        ] {
            tokio::fs::create_dir_all(&dir).await?;
        }
        Ok(())
    }

    pub async fn spool<S, E>(
        &self,
        stream: S,
        original_name: &str,
        kind: MediaKind,
    ) -> Result<SpooledUpload, UploadError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        spool_to_temp(stream, original_name, kind, self.limit(kind), &self.spool_dir()).await
    }

    /// Validate, store and register an uploaded track
    ///
    /// The audio file is written before the row is inserted. If anything
    /// fails after that, the stored files are removed and the transaction
    /// is rolled back. A bad cover does not fail the upload; it is reported
    /// in `warnings` instead.
    pub async fn store_track(
        &self,
        pool: &SqlitePool,
        user: &User,
        form: &TrackForm,
        audio: SpooledUpload,
        cover: Option<SpooledUpload>,
    ) -> Result<StoredTrack, AppError> {
        if !user.can_upload() {
            return Err(AppError::Forbidden(
                "You do not have permission to upload music.".into(),
            ));
        }

        let tags = probe_audio(audio.path(), Some(&audio.extension)).await?;
        let mut new_track = form.to_new_track(&tags, user.id)?;
        info!(
            "User {} uploading track '{}' ({})",
            user.email,
            new_track.title,
            format_file_size(audio.size)
        );

        let audio_name = generate_unique_filename(&audio.original_name, Some("audio"));
        let audio_path = self.music_dir().join(&audio_name);
        tokio::fs::create_dir_all(self.music_dir()).await.map_err(UploadError::from)?;
        audio
            .file
            .persist(&audio_path)
            .map_err(|e| UploadError::Io(e.error))?;
        let mut written = vec![audio_path];

        let mut warnings = Vec::new();
        let mut cover_name = None;
        if let Some(cover) = cover {
            match self.store_cover(&cover).await {
                Ok((name, path)) => {
                    written.push(path);
                    cover_name = Some(name);
                }
                Err(UploadError::Io(e)) => {
                    error!("Failed to store cover for '{}': {}", new_track.title, e);
                    remove_files(&written).await;
                    return Err(UploadError::Io(e).into());
                }
                Err(e) => {
                    warn!("Cover rejected for '{}': {}", new_track.title, e);
                    warnings.push(cover_warning(&e));
                }
            }
        }

        new_track.audio_file = audio_name.clone();
        new_track.cover_image = cover_name.clone();

        match self.insert_row(pool, &new_track).await {
            Ok(track_id) => {
                info!(
                    "Track '{}' uploaded by {} as #{}",
                    new_track.title, user.email, track_id
                );
                Ok(StoredTrack {
                    track_id,
                    audio_file: audio_name,
                    cover_image: cover_name,
                    warnings,
                })
            }
            Err(e) => {
                error!("Failed to register track '{}': {}", new_track.title, e);
                remove_files(&written).await;
                Err(e)
            }
        }
    }

    async fn insert_row(&self, pool: &SqlitePool, track: &NewTrack) -> Result<i64, AppError> {
        let mut tx = pool.begin().await?;
        let id = catalog::insert_track(&mut *tx, track).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn store_cover(&self, cover: &SpooledUpload) -> Result<(String, PathBuf), UploadError> {
        let bytes = tokio::fs::read(cover.path()).await?;
        let jpeg = normalize_cover(bytes).await?;

        let generated = generate_unique_filename(&cover.original_name, Some("cover"));
        let stem = generated
            .rsplit_once('.')
            .map_or(generated.as_str(), |(stem, _)| stem);
        let name = format!("{}.jpg", stem);

        tokio::fs::create_dir_all(self.covers_dir()).await?;
        let path = self.covers_dir().join(&name);
        tokio::fs::write(&path, jpeg).await?;
        Ok((name, path))
    }
}

async fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
