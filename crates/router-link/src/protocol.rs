//! Line protocol spoken with the router
//!
//! One JSON document per line. The framing is deliberately plain: the
//! normative part is only that the endpoint identity tuple round-trips
//! preserving address equality, not the byte layout.

use futures::io::{AsyncWrite, AsyncWriteExt};
use serde::{Deserialize, Serialize};
use service_directory::{Channel, Cookie, ProxyAddress, StubAddress};
use std::io;

/// One frame exchanged with the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RouterMessage {
    /// First frame of a connecting node.
    Hello {
        /// Cookie of the connecting process.
        cookie: Cookie,
    },
    /// Router's answer to `Hello`; the channel identifies the link.
    Welcome {
        /// Routing handle assigned to this node.
        channel: Channel,
    },
    /// A public stub came up.
    RegisterStub {
        /// Address of the stub.
        stub: StubAddress,
    },
    /// A public stub went down.
    UnregisterStub {
        /// Address of the stub.
        stub: StubAddress,
        /// Cookie of the withdrawing process.
        cookie: Cookie,
    },
    /// A public proxy came up.
    RegisterProxy {
        /// Address of the proxy.
        proxy: ProxyAddress,
    },
    /// A public proxy went down.
    UnregisterProxy {
        /// Address of the proxy.
        proxy: ProxyAddress,
        /// Cookie of the withdrawing process.
        cookie: Cookie,
    },
    /// Graceful end of the conversation.
    Bye,
}

/// Decode one received line.
pub fn decode_line(line: &str) -> serde_json::Result<RouterMessage> {
    serde_json::from_str(line.trim())
}

/// Encode and send one frame.
pub async fn write_message<W>(writer: &mut W, message: &RouterMessage) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut frame = serde_json::to_string(message)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    frame.push('\n');
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await
}
