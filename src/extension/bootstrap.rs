//! Connection bootstrap
//!
//! The shell launches the extension either with positional `key=value`
//! arguments or with a JSON object written to the extension's stdin. Exactly
//! one of the two sources is consulted per run: any process argument selects
//! the argument path.

use serde::Deserialize;
use std::env;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::{BootstrapError, BootstrapResult};

/// Loopback address of the shell's broker.
pub const BROKER_HOST: &str = "127.0.0.1";

const REQUIRED_ARGS: usize = 3;

/// Parameters needed to reach the shell's broker.
///
/// Immutable once built; the host only reads from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Broker port on the loopback interface
    pub port: u16,
    /// Access token stamped on every outbound envelope
    pub token: String,
    /// One-time token presented during the WebSocket handshake
    pub connect_token: Option<String>,
    /// Identifier the shell registered this extension under
    pub extension_id: String,
}

/// Wire shape of the stdin handshake object.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StdinConnection {
    nl_port: PortValue,
    nl_token: String,
    #[serde(default)]
    nl_connect_token: Option<String>,
    nl_extension_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(u64),
    Text(String),
}

impl PortValue {
    fn into_port(self) -> BootstrapResult<u16> {
        match self {
            PortValue::Number(n) => {
                u16::try_from(n).map_err(|_| BootstrapError::InvalidPort(n.to_string()))
            }
            PortValue::Text(text) => parse_port(&text),
        }
    }
}

impl TryFrom<StdinConnection> for ConnectionParams {
    type Error = BootstrapError;

    fn try_from(conf: StdinConnection) -> BootstrapResult<Self> {
        Ok(Self {
            port: conf.nl_port.into_port()?,
            token: conf.nl_token,
            connect_token: conf.nl_connect_token.filter(|t| !t.is_empty()),
            extension_id: conf.nl_extension_id,
        })
    }
}

impl ConnectionParams {
    /// Discover parameters from the current process.
    ///
    /// Uses the command-line arguments when any are present, otherwise reads
    /// one JSON object from stdin.
    pub async fn from_process() -> BootstrapResult<Self> {
        let args: Vec<String> = env::args().skip(1).collect();
        if !args.is_empty() {
            tracing::debug!(count = args.len(), "reading connection parameters from arguments");
            return Self::from_args(args);
        }

        tracing::debug!("reading connection parameters from stdin");
        Self::from_reader(tokio::io::stdin()).await
    }

    /// Parse positional `port=.. token=.. extid=..` arguments.
    ///
    /// Only the part after the first `=` is used, so the key names are not
    /// checked. Extra trailing arguments are ignored. No connect token is
    /// available on this path.
    pub fn from_args<I, S>(args: I) -> BootstrapResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<S> = args.into_iter().collect();
        if args.len() < REQUIRED_ARGS {
            return Err(BootstrapError::MissingArguments {
                expected: REQUIRED_ARGS,
                found: args.len(),
            });
        }

        Ok(Self {
            port: parse_port(arg_value(&args, 0)?)?,
            token: arg_value(&args, 1)?.to_string(),
            connect_token: None,
            extension_id: arg_value(&args, 2)?.to_string(),
        })
    }

    /// Read a single JSON connection object from `reader`.
    ///
    /// Returns as soon as one complete value has arrived; the stream does not
    /// need to be closed by the shell.
    pub async fn from_reader<R>(mut reader: R) -> BootstrapResult<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = Vec::with_capacity(512);
        let mut chunk = [0u8; 512];

        loop {
            let read = reader.read(&mut chunk).await?;
            if read == 0 {
                return parse_connection_object(&buf)?.ok_or(BootstrapError::UnexpectedEof);
            }

            buf.extend_from_slice(&chunk[..read]);
            if let Some(params) = parse_connection_object(&buf)? {
                return Ok(params);
            }
        }
    }

    /// Broker URL for the extension's WebSocket connection.
    pub fn socket_url(&self) -> String {
        let mut url = format!(
            "ws://{}:{}/?extensionId={}",
            BROKER_HOST, self.port, self.extension_id
        );
        if let Some(connect_token) = &self.connect_token {
            url.push_str("&connectToken=");
            url.push_str(connect_token);
        }
        url
    }
}

/// Try to decode the first JSON value in `buf`; `None` means more input is needed.
fn parse_connection_object(buf: &[u8]) -> BootstrapResult<Option<ConnectionParams>> {
    let mut stream = serde_json::Deserializer::from_slice(buf).into_iter::<StdinConnection>();
    match stream.next() {
        None => Ok(None),
        Some(Ok(conf)) => ConnectionParams::try_from(conf).map(Some),
        Some(Err(err)) if err.is_eof() => Ok(None),
        Some(Err(err)) => Err(err.into()),
    }
}

fn arg_value<S: AsRef<str>>(args: &[S], position: usize) -> BootstrapResult<&str> {
    let raw = args[position].as_ref();
    raw.split_once('=')
        .map(|(_, value)| value)
        .ok_or_else(|| BootstrapError::MalformedArgument {
            position,
            raw: raw.to_string(),
        })
}

fn parse_port(text: &str) -> BootstrapResult<u16> {
    text.trim()
        .parse()
        .map_err(|_| BootstrapError::InvalidPort(text.to_string()))
}
