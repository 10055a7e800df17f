use std::sync::Arc;

use super::super::{
    codec::Codec,
    error::{Error, Result},
    frame::encap::{command, register_session_body, EipFrame},
};
use super::state::SessionConfig;
use futures_util::{SinkExt, StreamExt};
use tokio::{net::TcpStream, time::timeout};
use tokio_util::codec::Framed;

/// Perform EIP RegisterSession on an already connected framed transport.
///
/// Returns the session handle assigned by the device; all subsequent frames
/// must carry it in their header.
pub(super) async fn register_session(
    framed: &mut Framed<TcpStream, Codec>,
    config: Arc<SessionConfig>,
) -> Result<u32> {
    let request = EipFrame::new(command::REGISTER_SESSION, 0, 0, register_session_body());
    timeout(config.request_timeout, framed.send(request))
        .await
        .map_err(|_| Error::ErrRequestTimeout)?
        .map_err(Error::Io)?;

    let maybe_frame = timeout(config.request_timeout, framed.next())
        .await
        .map_err(|_| Error::ErrRequestTimeout)?;
    let frame = maybe_frame
        .ok_or(Error::ErrUseClosedConnection)?
        .map_err(Error::Io)?;

    if frame.header.command != command::REGISTER_SESSION {
        return Err(Error::ErrUnexpectedReply { context: "expected RegisterSession reply" });
    }
    if frame.header.status != 0 {
        return Err(Error::EncapStatus(frame.header.status));
    }
    if frame.header.session == 0 {
        return Err(Error::ErrUnexpectedReply { context: "device assigned a zero session handle" });
    }
    Ok(frame.header.session)
}
