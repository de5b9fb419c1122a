use crate::warehouse::{insert_songplay, SongReference, Songplay, TimeRow, User};
use rusqlite::Connection;

/// Session-scoped attributes of a play that end up on the fact row as is.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayContext {
    pub session_id: i64,
    pub location: Option<String>,
    pub user_agent: Option<String>,
}

pub fn assemble_songplay(
    time: &TimeRow,
    user: &User,
    reference: SongReference,
    context: PlayContext,
) -> Songplay {
    Songplay {
        start_time: time.start_time.clone(),
        user_id: user.user_id,
        level: user.level.clone(),
        song_id: reference.song_id,
        artist_id: reference.artist_id,
        session_id: context.session_id,
        location: context.location,
        user_agent: context.user_agent,
    }
}

/// Append one fact row. Never deduplicates.
pub fn record_songplay(
    conn: &Connection,
    time: &TimeRow,
    user: &User,
    reference: SongReference,
    context: PlayContext,
) -> rusqlite::Result<Songplay> {
    let songplay = assemble_songplay(time, user, reference, context);
    insert_songplay(conn, &songplay)?;
    Ok(songplay)
}
