use std::time::Duration;

/// Capacity of the in-memory message payload cache.
pub const MESSAGE_CACHE_MAX: u64 = 500;
/// How long a cached message payload stays dereferenceable.
pub const MESSAGE_CACHE_AGE: Duration = Duration::from_secs(60 * 60);

/// Minimum spacing between consecutive sync submissions to the gateway.
pub const SYNC_INTERVAL: Duration = Duration::from_millis(200);

/// Window in which repeated reconnect signals collapse into one restart.
pub const RECONNECT_DEBOUNCE: Duration = Duration::from_secs(5);

/// How long a pending-reply waiter sleeps before re-issuing its sync request.
pub const REPLY_RETRY_INTERVAL: Duration = Duration::from_secs(3);

/// Delay between gateway connect attempts during startup.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Attempts at resolving a display name against room membership before an
/// empty result is emitted.
pub const NAME_RESOLVE_ATTEMPTS: u32 = 3;

/// Rooms above this size take the invite path instead of a direct add.
pub const ROOM_DIRECT_ADD_LIMIT: usize = 40;

#[derive(Clone, Debug, Default)]
pub struct BridgeConfig {
    /// WebSocket endpoint of the gateway control channel.
    pub endpoint: String,
    /// Access token identifying this bridge instance to the gateway.
    pub token: String,
    /// Directory for the entity store and the session slot.
    pub store_dir: String,
}
