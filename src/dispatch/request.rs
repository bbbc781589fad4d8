use std::sync::Arc;

use bytes::Bytes;

use crate::network::{Connection, Frame};

/// Pairs a decoded [`Frame`] with the [`Connection`] it arrived on.
///
/// A request is owned by whichever task ends up handling it, a pool worker or
/// an ad-hoc task, and is discarded after handling.
#[derive(Debug)]
pub struct Request {
    conn: Arc<Connection>,
    frame: Frame,
}

impl Request {
    pub fn new(conn: Arc<Connection>, frame: Frame) -> Request {
        Request { conn, frame }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    pub fn msg_id(&self) -> u32 {
        self.frame.msg_id
    }

    pub fn payload(&self) -> &Bytes {
        &self.frame.payload
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }
}
