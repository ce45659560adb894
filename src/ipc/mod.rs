// IPC module - Communication between client and daemon

pub mod client;
pub mod protocol;
pub mod server;

pub use client::IpcClient;
pub use protocol::{AppResult, Command, Request, Response, ResponseData};
pub use server::{IpcServer, DEFAULT_SOCKET_PATH};
