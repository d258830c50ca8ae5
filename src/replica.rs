/*!
 * Replica-to-Master Handshake
 *
 * When configured as a replica, the instance runs this short-lived
 * sequential exchange against its master before the serve loop starts:
 * PING expecting PONG, REPLCONF listening-port expecting OK, REPLCONF
 * capa psync2 expecting OK. Each step sends one frame and blocks for one
 * reply; there is no timeout, so a silent master stalls startup
 * indefinitely. Any connect failure, I/O error, or unexpected reply
 * aborts the handshake and the instance never begins serving clients.
 */

use crate::config::Config;
use crate::protocol::{parse_simple, resp_array};
use anyhow::{bail, Context, Result};
use log::info;
use std::io::{Read, Write};
use std::net::TcpStream;

/// The three exchanges of the handshake, in execution order
#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    Ping,
    ListeningPort,
    Capa,
}

impl Step {
    fn request(self, own_port: u16) -> Vec<String> {
        match self {
            Step::Ping => vec!["PING".into()],
            Step::ListeningPort => vec![
                "REPLCONF".into(),
                "listening-port".into(),
                own_port.to_string(),
            ],
            Step::Capa => vec!["REPLCONF".into(), "capa".into(), "psync2".into()],
        }
    }

    fn expected_reply(self) -> &'static str {
        match self {
            Step::Ping => "PONG",
            Step::ListeningPort | Step::Capa => "OK",
        }
    }

    fn next(self) -> Option<Step> {
        match self {
            Step::Ping => Some(Step::ListeningPort),
            Step::ListeningPort => Some(Step::Capa),
            Step::Capa => None,
        }
    }
}

/// Run the handshake to completion and hand back the master link
///
/// The returned stream has served its purpose once the handshake is
/// done; the multiplexer retains it so the connection stays up, but no
/// further traffic is exchanged on it at this stage of replication
/// support.
pub fn perform_handshake(config: &Config) -> Result<TcpStream> {
    let master = config
        .replica_of()
        .context("handshake requires a master address")?;

    let mut stream = TcpStream::connect((master.host.as_str(), master.port))
        .with_context(|| format!("failed to connect to master at {}:{}", master.host, master.port))?;
    info!("connected to master at {}:{}", master.host, master.port);

    let mut step = Some(Step::Ping);
    while let Some(current) = step {
        exchange(&mut stream, &current.request(config.port()), current.expected_reply())
            .with_context(|| format!("handshake step {current:?} failed"))?;
        info!("handshake step {current:?} acknowledged");
        step = current.next();
    }

    info!("handshake with master completed");
    Ok(stream)
}

/// Send one request frame and block for the expected simple-string reply
fn exchange(stream: &mut TcpStream, request: &[String], expected: &str) -> Result<()> {
    stream.write_all(&resp_array(request))?;

    let mut buf = [0u8; 256];
    let n = stream.read(&mut buf)?;
    if n == 0 {
        bail!("master closed the connection mid-handshake");
    }

    let reply = parse_simple(&buf[..n]);
    if reply != expected {
        bail!("expected +{expected}, master answered {reply:?}");
    }
    Ok(())
}
