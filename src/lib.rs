//! Async client for Allen-Bradley SLC 500, MicroLogix and PLC-5 processors.
//!
//! The stack tunnels PCCC (Programmable Controller Communication Commands)
//! inside CIP Execute-PCCC requests carried over an EtherNet/IP TCP session:
//!
//! - an EIP session layer (RegisterSession, SendRRData, ListIdentity, NOP
//!   keepalive) driven by a tokio event loop,
//! - CIP framing with direct and Connection-Manager-routed unconnected
//!   messaging,
//! - PCCC command framing (protected typed logical read/write, read
//!   section, diagnostic status) with compact address-field encoding,
//! - a textual data-table address model (`N7:0`, `B3:0/5`, `T4:0.ACC`),
//! - a value codec for integer/float/long/string and the compound
//!   Timer/Counter/Control elements,
//! - file-directory discovery for SLC/MicroLogix processors, and
//! - a batch planner that folds contiguous element reads into bulk
//!   round-trips with per-tag error isolation.
//!
//! ```no_run
//! use ab_pccc::{Client, ClientConfig};
//!
//! # async fn demo() -> ab_pccc::Result<()> {
//! let client = Client::connect("192.168.1.100", ClientConfig::default()).await?;
//! for tag in client.read(&["N7:0", "F8:5", "T4:0.ACC", "B3:0/5"]).await? {
//!     println!("{} = {:?}", tag.name, tag.value);
//! }
//! client.write("N7:0", 42i16).await?;
//! client.close().await;
//! # Ok(())
//! # }
//! ```

mod client;
pub mod protocol;

pub use client::{Client, ClientConfig, TagInfo, TagReadResult, DEFAULT_PORT};
pub use protocol::{
    addr::{parse_data_table_address, DataTableAddress},
    discovery::{FileDirectoryEntry, Sys0Layout},
    error::{Error, PcccStatusCategory, Result},
    frame::{identity::Identity, RoutePath},
    planner::MAX_TYPED_READ_BYTES,
    session::{SessionConfig, SessionEvent, SessionLifecycleState},
    types::PlcKind,
    value::{PcccValue, MAX_STRING_LEN},
};
