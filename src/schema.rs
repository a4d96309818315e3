use sea_query::Iden;

/// Metadata table - key-value store for database configuration
#[derive(Iden)]
pub enum Metadata {
    Table,
    Key,
    Value,
}

/// Users table - accounts of admins, teachers and students
#[derive(Iden)]
pub enum Users {
    Table,
    Id,
    Email,
    FirstName,
    LastName,
    PasswordHash,
    Role,
    Grade,
    Section,
    Specialty,
    Avatar,
    IsActive,
    RegisteredAt,
    LastAccessAt,
}

/// Sessions table - login sessions keyed by the cookie token
#[derive(Iden)]
pub enum Sessions {
    Table,
    Token,
    UserId,
    CreatedAt,
    ExpiresAt,
}

/// Tracks table - uploaded audio items
#[derive(Iden)]
pub enum Tracks {
    Table,
    Id,
    Title,
    Artist,
    Album,
    Genre,
    Year,
    DurationSecs,
    AudioFile,
    CoverImage,
    Description,
    Subject,
    TargetGrade,
    UploadedBy,
    UploadedAt,
    IsActive,
    PlayCount,
}

/// Playlists table - named collections owned by a user
#[derive(Iden)]
pub enum Playlists {
    Table,
    Id,
    Name,
    Description,
    CoverImage,
    IsPublic,
    OwnerId,
    CreatedAt,
    IsActive,
}

/// Playlist entries - ordered membership of tracks in playlists
#[derive(Iden)]
pub enum PlaylistEntries {
    Table,
    Id,
    PlaylistId,
    TrackId,
    Position,
    AddedAt,
}

/// Play events - append-only playback log
#[derive(Iden)]
pub enum PlayEvents {
    Table,
    Id,
    UserId,
    TrackId,
    PlayedAt,
    SecondsPlayed,
    Completed,
}
