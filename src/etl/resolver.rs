use crate::warehouse::{find_song_reference, SongReference};
use rusqlite::Connection;

/// Resolve the catalog song a play refers to.
///
/// Plays missing any of title, artist or duration cannot match exactly and
/// are left unresolved without touching the store.
pub fn resolve_song(
    conn: &Connection,
    title: Option<&str>,
    artist_name: Option<&str>,
    duration: Option<f64>,
) -> rusqlite::Result<SongReference> {
    match (title, artist_name, duration) {
        (Some(title), Some(artist_name), Some(duration)) => {
            find_song_reference(conn, title, artist_name, duration)
        }
        _ => Ok(SongReference::unresolved()),
    }
}
