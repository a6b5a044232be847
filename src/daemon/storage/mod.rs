//!  Storage is organized around [PersistenceSink], the narrow interface the session manager writes
//!  through. The basic idea is:
//!   - A session row is created optimistically as soon as a window gains focus.
//!   - It is either completed with its final duration or deleted when it turned out too short.
//!   - Enriched samples are appended on every tick independently of session boundaries.
//!
//!  [sqlite::SqliteSessionStore] is the on-disk realization.

pub mod entities;
mod migrations;
pub mod sqlite;

use anyhow::Result;
use entities::{EnrichedSample, NewSession, SessionClose, SessionId};

/// Append-mostly session store. Timestamps are always supplied by the caller so that a closing
/// event is described by a single clock reading.
pub trait PersistenceSink: Send {
    fn start_session(&mut self, session: &NewSession) -> Result<SessionId>;

    /// Marks the session as finished, storing its end time and duration.
    fn end_session(&mut self, id: SessionId, close: &SessionClose) -> Result<()>;

    /// Removes a session that never reached the minimum duration.
    fn delete_session(&mut self, id: SessionId) -> Result<()>;

    fn record_enriched_sample(&mut self, sample: &EnrichedSample) -> Result<()>;
}

impl<T: PersistenceSink + ?Sized> PersistenceSink for Box<T> {
    fn start_session(&mut self, session: &NewSession) -> Result<SessionId> {
        (**self).start_session(session)
    }

    fn end_session(&mut self, id: SessionId, close: &SessionClose) -> Result<()> {
        (**self).end_session(id, close)
    }

    fn delete_session(&mut self, id: SessionId) -> Result<()> {
        (**self).delete_session(id)
    }

    fn record_enriched_sample(&mut self, sample: &EnrichedSample) -> Result<()> {
        (**self).record_enriched_sample(sample)
    }
}
