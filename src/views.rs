//! Server-rendered HTML pages

use axum::http::StatusCode;
use std::fmt::Write;

use crate::catalog::{DashboardStats, Page, Playlist, PlaylistEntry, Track, TrackFilter};
use crate::constants::{GENRES, GRADES, SECTIONS, SUBJECTS};
use crate::users::User;

/// Escape text for use inside HTML element content and quoted attributes
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

pub fn genre_label(slug: &str) -> &str {
    match slug {
        "educativo" => "Educational",
        "clasico" => "Classical",
        "folclore" => "Folklore",
        "infantil" => "Children",
        "rock" => "Rock",
        "pop" => "Pop",
        "jazz" => "Jazz",
        "electronico" => "Electronic",
        "reggaeton" => "Reggaeton",
        "salsa" => "Salsa",
        "cumbia" => "Cumbia",
        "otro" => "Other",
        other => other,
    }
}

pub fn subject_label(slug: &str) -> &str {
    match slug {
        "matematicas" => "Mathematics",
        "comunicacion" => "Communication",
        "ciencias" => "Science",
        "historia" => "History",
        "geografia" => "Geography",
        "ingles" => "English",
        "educacion_fisica" => "Physical Education",
        "arte" => "Art",
        "religion" => "Religion",
        "tutoria" => "Tutoring",
        "general" => "General",
        other => other,
    }
}

/// A one-shot message shown on the next rendered page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub level: String,
    pub message: String,
}

impl Flash {
    pub fn new(level: &str, message: impl Into<String>) -> Self {
        Flash {
            level: level.to_string(),
            message: message.into(),
        }
    }
}

/// What every page needs to draw its chrome
#[derive(Debug, Default)]
pub struct PageContext<'a> {
    pub user: Option<&'a User>,
    pub flashes: Vec<Flash>,
}

fn navigation(user: Option<&User>) -> String {
    let mut nav = String::from(r#"<nav><a href="/">Home</a>"#);
    match user {
        Some(user) => {
            nav.push_str(r#" <a href="/biblioteca">Library</a> <a href="/populares">Popular</a> <a href="/playlists">Playlists</a>"#);
            if user.can_upload() {
                nav.push_str(r#" <a href="/subir">Upload</a>"#);
            }
            let _ = write!(
                nav,
                r#" <span class="user">{} ({})</span> <a href="/logout">Log out</a>"#,
                escape(&user.full_name()),
                user.role.label()
            );
        }
        None => nav.push_str(r#" <a href="/login">Log in</a> <a href="/registro">Register</a>"#),
    }
    nav.push_str("</nav>");
    nav
}

fn layout(ctx: &PageContext<'_>, title: &str, body: &str) -> String {
    let mut flashes = String::new();
    for flash in &ctx.flashes {
        let _ = write!(
            flashes,
            r#"<div class="flash flash-{}">{}</div>"#,
            escape(&flash.level),
            escape(&flash.message)
        );
    }
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} - Aula Audio</title>
</head>
<body>
<header>{nav}</header>
<main>
{flashes}
{body}
</main>
</body>
</html>
"#,
        title = escape(title),
        nav = navigation(ctx.user),
        flashes = flashes,
        body = body,
    )
}

fn select_options(
    name: &str,
    placeholder: &str,
    values: &[&str],
    selected: Option<&str>,
    label: fn(&str) -> &str,
) -> String {
    let mut html = format!(
        r#"<select name="{}"><option value="">{}</option>"#,
        name,
        escape(placeholder)
    );
    for value in values {
        let mark = if selected == Some(*value) { " selected" } else { "" };
        let _ = write!(
            html,
            r#"<option value="{v}"{mark}>{l}</option>"#,
            v = escape(value),
            mark = mark,
            l = escape(label(value))
        );
    }
    html.push_str("</select>");
    html
}

fn identity(value: &str) -> &str {
    value
}

fn cover_img(track: &Track) -> String {
    match track.cover_url() {
        Some(url) => format!(r#"<img class="cover" src="{}" alt="">"#, escape(&url)),
        None => r#"<div class="cover placeholder"></div>"#.to_string(),
    }
}

fn track_card(track: &Track) -> String {
    let mut extra = String::new();
    if let Some(genre) = &track.genre {
        let _ = write!(extra, r#" <span class="genre">{}</span>"#, escape(genre_label(genre)));
    }
    if let Some(subject) = &track.subject {
        let _ = write!(extra, r#" <span class="subject">{}</span>"#, escape(subject_label(subject)));
    }
    format!(
        r#"<li class="track">{cover}<a href="/reproductor/{id}">{title}</a> by {artist} <span class="duration">{duration}</span> <span class="plays">{plays} plays</span>{extra}</li>"#,
        cover = cover_img(track),
        id = track.id,
        title = escape(&track.title),
        artist = escape(&track.artist),
        duration = track.duration_label(),
        plays = track.play_count,
        extra = extra,
    )
}

fn track_list(tracks: &[Track]) -> String {
    if tracks.is_empty() {
        return r#"<p class="empty">No tracks yet.</p>"#.to_string();
    }
    let items: String = tracks.iter().map(track_card).collect();
    format!(r#"<ul class="tracks">{}</ul>"#, items)
}

fn playlist_card(playlist: &Playlist) -> String {
    let visibility = if playlist.is_public { "public" } else { "private" };
    format!(
        r#"<li class="playlist"><a href="/playlists/{id}">{name}</a> <span class="{v}">{v}</span> <time>{created}</time></li>"#,
        id = playlist.id,
        name = escape(&playlist.name),
        v = visibility,
        created = playlist.created_at().format("%Y-%m-%d"),
    )
}

fn playlist_list(playlists: &[Playlist]) -> String {
    if playlists.is_empty() {
        return r#"<p class="empty">No playlists.</p>"#.to_string();
    }
    let items: String = playlists.iter().map(playlist_card).collect();
    format!(r#"<ul class="playlists">{}</ul>"#, items)
}

/// Previous / next links that keep the other query parameters
fn pager<T>(page: &Page<T>, base: &str, query: &str) -> String {
    if page.total_pages() <= 1 {
        return String::new();
    }
    let href = |n: u64| {
        let sep = if query.is_empty() { "" } else { "&" };
        escape(&format!("{}?{}{}page={}", base, query, sep, n))
    };
    let mut html = String::from(r#"<nav class="pager">"#);
    if page.has_prev() {
        let _ = write!(html, r#"<a href="{}">Previous</a> "#, href(page.page - 1));
    }
    let _ = write!(html, "Page {} of {}", page.page, page.total_pages());
    if page.has_next() {
        let _ = write!(html, r#" <a href="{}">Next</a>"#, href(page.page + 1));
    }
    html.push_str("</nav>");
    html
}

pub fn dashboard_page(
    ctx: &PageContext<'_>,
    stats: &DashboardStats,
    popular: &[Track],
    recent: &[Playlist],
) -> String {
    let body = format!(
        r#"<h1>School music library</h1>
<section class="stats">
<div><strong>{tracks}</strong> tracks</div>
<div><strong>{teachers}</strong> teachers</div>
<div><strong>{students}</strong> students</div>
</section>
<h2>Most played</h2>
{popular}
<h2>Recent public playlists</h2>
{recent}"#,
        tracks = stats.tracks,
        teachers = stats.teachers,
        students = stats.students,
        popular = track_list(popular),
        recent = playlist_list(recent),
    );
    layout(ctx, "Home", &body)
}

pub fn login_page(ctx: &PageContext<'_>, email: &str, next: Option<&str>) -> String {
    let action = match next {
        Some(next) => format!("/login?next={}", urlencoding::encode(next)),
        None => "/login".to_string(),
    };
    let body = format!(
        r#"<h1>Log in</h1>
<form method="post" action="{action}">
<label>Email <input type="email" name="email" value="{email}" required></label>
<label>Password <input type="password" name="password" required></label>
<label><input type="checkbox" name="recordarme" value="1"> Remember me</label>
<button type="submit">Log in</button>
</form>
<p>No account yet? <a href="/registro">Register</a></p>"#,
        action = escape(&action),
        email = escape(email),
    );
    layout(ctx, "Log in", &body)
}

pub fn register_page(ctx: &PageContext<'_>, form: &crate::users::Registration) -> String {
    let role_option = |value: &str, label: &str| {
        let mark = if form.role == value { " selected" } else { "" };
        format!(r#"<option value="{}"{}>{}</option>"#, value, mark, label)
    };
    let body = format!(
        r#"<h1>Register</h1>
<form method="post" action="/registro">
<label>Email <input type="email" name="email" value="{email}" required></label>
<label>First name <input name="nombre" value="{first}" required></label>
<label>Last name <input name="apellidos" value="{last}" required></label>
<label>Password <input type="password" name="password" required></label>
<label>Repeat password <input type="password" name="password2" required></label>
<label>Role <select name="rol">{student}{teacher}</select></label>
<fieldset><legend>Students</legend>
<label>Grade {grades}</label>
<label>Section {sections}</label>
</fieldset>
<fieldset><legend>Teachers</legend>
<label>Specialty <input name="especialidad" value="{specialty}"></label>
</fieldset>
<button type="submit">Register</button>
</form>"#,
        email = escape(&form.email),
        first = escape(&form.first_name),
        last = escape(&form.last_name),
        student = role_option("estudiante", "Student"),
        teacher = role_option("docente", "Teacher"),
        grades = select_options("grado", "-", GRADES, Some(form.grade.as_str()), identity),
        sections = select_options("seccion", "-", SECTIONS, Some(form.section.as_str()), identity),
        specialty = escape(&form.specialty),
    );
    layout(ctx, "Register", &body)
}

pub fn library_page(ctx: &PageContext<'_>, page: &Page<Track>, filter: &TrackFilter) -> String {
    let mut query = Vec::new();
    if let Some(text) = &filter.text {
        query.push(format!("buscar={}", urlencoding::encode(text)));
    }
    if let Some(genre) = &filter.genre {
        query.push(format!("genero={}", urlencoding::encode(genre)));
    }
    if let Some(subject) = &filter.subject {
        query.push(format!("materia={}", urlencoding::encode(subject)));
    }

    let body = format!(
        r#"<h1>Library</h1>
<form method="get" action="/biblioteca" class="search">
<input name="buscar" placeholder="Title, artist or album" value="{text}">
{genres}
{subjects}
<button type="submit">Search</button>
</form>
<p>{total} tracks found</p>
{tracks}
{pager}"#,
        text = escape(filter.text.as_deref().unwrap_or("")),
        genres = select_options("genero", "All genres", GENRES, filter.genre.as_deref(), genre_label),
        subjects = select_options("materia", "All subjects", SUBJECTS, filter.subject.as_deref(), subject_label),
        total = page.total,
        tracks = track_list(&page.items),
        pager = pager(page, "/biblioteca", &query.join("&")),
    );
    layout(ctx, "Library", &body)
}

pub fn popular_page(ctx: &PageContext<'_>, tracks: &[Track]) -> String {
    let mut rows = String::new();
    for (rank, track) in tracks.iter().enumerate() {
        let _ = write!(
            rows,
            r#"<tr><td>{}</td><td><a href="/reproductor/{}">{}</a></td><td>{}</td><td>{}</td></tr>"#,
            rank + 1,
            track.id,
            escape(&track.title),
            escape(&track.artist),
            track.play_count
        );
    }
    let body = format!(
        r#"<h1>Most popular</h1>
<table class="ranking"><thead><tr><th>#</th><th>Title</th><th>Artist</th><th>Plays</th></tr></thead>
<tbody>{}</tbody></table>"#,
        rows
    );
    layout(ctx, "Popular", &body)
}

pub fn upload_page(ctx: &PageContext<'_>, audio_limit_mb: u64, image_limit_mb: u64) -> String {
    let body = format!(
        r#"<h1>Upload a track</h1>
<form method="post" action="/subir" enctype="multipart/form-data">
<label>Title <input name="titulo" maxlength="200"></label>
<label>Artist <input name="artista" maxlength="200"></label>
<label>Album <input name="album" maxlength="200"></label>
<label>Genre {genres}</label>
<label>Year <input name="anio" inputmode="numeric"></label>
<label>Subject {subjects}</label>
<label>Target grade {grades}</label>
<label>Description <textarea name="descripcion" maxlength="500"></textarea></label>
<label>Audio file (mp3, wav, ogg, flac, m4a; up to {audio} MB) <input type="file" name="archivo_audio" accept=".mp3,.wav,.ogg,.flac,.m4a" required></label>
<label>Cover image (png, jpg, gif, webp; up to {image} MB) <input type="file" name="cover_image" accept=".png,.jpg,.jpeg,.gif,.webp"></label>
<button type="submit">Upload</button>
</form>"#,
        genres = select_options("genero", "Choose a genre", GENRES, None, genre_label),
        subjects = select_options("materia", "Choose a subject", SUBJECTS, None, subject_label),
        grades = select_options("grado_objetivo", "All grades", GRADES, None, identity),
        audio = audio_limit_mb,
        image = image_limit_mb,
    );
    layout(ctx, "Upload", &body)
}

pub fn player_page(ctx: &PageContext<'_>, track: &Track, playlists: &[Playlist]) -> String {
    let mut details = String::new();
    if let Some(album) = &track.album {
        let _ = write!(details, "<dt>Album</dt><dd>{}</dd>", escape(album));
    }
    if let Some(year) = track.year {
        let _ = write!(details, "<dt>Year</dt><dd>{}</dd>", year);
    }
    if let Some(genre) = &track.genre {
        let _ = write!(details, "<dt>Genre</dt><dd>{}</dd>", escape(genre_label(genre)));
    }
    if let Some(subject) = &track.subject {
        let _ = write!(details, "<dt>Subject</dt><dd>{}</dd>", escape(subject_label(subject)));
    }
    if let Some(description) = &track.description {
        let _ = write!(details, "<dt>Description</dt><dd>{}</dd>", escape(description));
    }

    let mut add_form = String::new();
    if !playlists.is_empty() {
        let options: String = playlists
            .iter()
            .map(|p| format!(r#"<option value="{}">{}</option>"#, p.id, escape(&p.name)))
            .collect();
        let _ = write!(
            add_form,
            r#"<form method="post" id="add-to-playlist" onsubmit="this.action='/playlists/'+this.playlist.value+'/canciones'">
<input type="hidden" name="cancion_id" value="{}">
<select name="playlist">{}</select>
<button type="submit">Add to playlist</button>
</form>"#,
            track.id, options
        );
    }

    let body = format!(
        r#"<h1>{title}</h1>
<p class="artist">{artist}</p>
{cover}
<audio id="player" controls preload="metadata" src="/stream/{id}" data-track="{id}"></audio>
<p>Duration {duration} &middot; {plays} plays</p>
<dl>{details}</dl>
{add_form}
<script>
(function () {{
  var audio = document.getElementById('player');
  function report(completed) {{
    fetch('/api/reproduccion', {{
      method: 'POST',
      headers: {{ 'Content-Type': 'application/json' }},
      body: JSON.stringify({{ cancion_id: {id}, segundos: Math.floor(audio.currentTime), completada: completed }})
    }});
  }}
  audio.addEventListener('pause', function () {{ report(false); }});
  audio.addEventListener('ended', function () {{ report(true); }});
}})();
</script>"#,
        title = escape(&track.title),
        artist = escape(&track.artist),
        cover = cover_img(track),
        id = track.id,
        duration = track.duration_label(),
        plays = track.play_count,
        details = details,
        add_form = add_form,
    );
    layout(ctx, &track.title, &body)
}

pub fn playlists_page(ctx: &PageContext<'_>, own: &[Playlist], public: &Page<Playlist>) -> String {
    let body = format!(
        r#"<h1>Playlists</h1>
<form method="post" action="/playlists">
<label>Name <input name="nombre" maxlength="200" required></label>
<label>Description <textarea name="descripcion" maxlength="500"></textarea></label>
<label><input type="checkbox" name="publica" value="1"> Public</label>
<button type="submit">Create playlist</button>
</form>
<h2>My playlists</h2>
{own}
<h2>Public playlists</h2>
{public}
{pager}"#,
        own = playlist_list(own),
        public = playlist_list(&public.items),
        pager = pager(public, "/playlists", ""),
    );
    layout(ctx, "Playlists", &body)
}

pub fn playlist_page(
    ctx: &PageContext<'_>,
    playlist: &Playlist,
    entries: &[PlaylistEntry],
    total_duration: &str,
    can_edit: bool,
    can_delete: bool,
) -> String {
    let mut rows = String::new();
    for entry in entries {
        let _ = write!(
            rows,
            r#"<li value="{pos}"><a href="/reproductor/{id}">{title}</a> by {artist} <span class="duration">{duration}</span></li>"#,
            pos = entry.position,
            id = entry.track.id,
            title = escape(&entry.track.title),
            artist = escape(&entry.track.artist),
            duration = entry.track.duration_label(),
        );
    }

    let mut actions = String::new();
    if can_edit {
        let _ = write!(
            actions,
            r#"<form method="post" action="/playlists/{}/canciones">
<label>Track id <input name="cancion_id" inputmode="numeric" required></label>
<button type="submit">Add track</button>
</form>"#,
            playlist.id
        );
    }
    if can_delete {
        let _ = write!(
            actions,
            r#"<form method="post" action="/playlists/{}/eliminar" onsubmit="return confirm('Delete this playlist?')">
<button type="submit">Delete playlist</button>
</form>"#,
            playlist.id
        );
    }

    let body = format!(
        r#"<h1>{name}</h1>
<p>{description}</p>
<p>{count} tracks &middot; {duration}</p>
<ol class="entries">{rows}</ol>
{actions}"#,
        name = escape(&playlist.name),
        description = escape(playlist.description.as_deref().unwrap_or("")),
        count = entries.len(),
        duration = total_duration,
        rows = rows,
        actions = actions,
    );
    layout(ctx, &playlist.name, &body)
}

pub fn not_found_page() -> String {
    layout(
        &PageContext::default(),
        "Not found",
        r#"<h1>Page not found</h1><p>The page you are looking for does not exist.</p><p><a href="/">Back to home</a></p>"#,
    )
}

pub fn server_error_page() -> String {
    layout(
        &PageContext::default(),
        "Error",
        r#"<h1>Something went wrong</h1><p>An unexpected error occurred. Please try again.</p><p><a href="/">Back to home</a></p>"#,
    )
}

pub fn error_page(status: StatusCode, message: &str) -> String {
    let body = format!(
        r#"<h1>{}</h1><p>{}</p><p><a href="/">Back to home</a></p>"#,
        status.as_u16(),
        escape(message)
    );
    layout(&PageContext::default(), status.canonical_reason().unwrap_or("Error"), &body)
}
