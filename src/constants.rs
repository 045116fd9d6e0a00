// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

// Relay policy constants
pub const DEFAULT_MAX_CLIENTS: usize = 4;
pub const DEFAULT_RATE_LIMIT_COOLDOWN_SECS: u64 = 5;
/// Maximum frame size in bytes, terminator included
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024;
pub const MESSAGE_TERMINATOR: u8 = 0;

// Worker pool configuration constants
pub const DEFAULT_WORKER_THREADS: usize = 4;

// Protocol keywords
pub const QUIT_SENTINEL: &str = "quit";
pub const DEFAULT_STOP_KEYWORD: &str = "quit";

// Notices sent to clients
pub const DEFAULT_ACK_MESSAGE: &str = "Server received your message.";
pub const SERVER_FULL_NOTICE: &str = "Server is full. Please wait for a free slot.";
pub const RATE_LIMITED_NOTICE: &str =
    "You're sending messages too quickly. Please wait before sending another message.";
pub const SHUTDOWN_NOTICE: &str = "Server is closing connection. You will be disconnected";
