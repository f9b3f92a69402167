pub const ASSOCIATION_CREATE: &str = "association_create";
pub const ASSOCIATION_BIND: &str = "association_bind";
pub const ASSOCIATION_BIND_REJECTED: &str = "association_bind_rejected";
pub const ASSOCIATION_RELEASE: &str = "association_release";
pub const ASSOCIATION_RELEASE_UNKNOWN: &str = "association_release_unknown";
pub const ASSOCIATION_RELEASE_STALE: &str = "association_release_stale";
pub const ASSOCIATION_CLOSE: &str = "association_close";

pub const PRODUCER_SEND: &str = "producer_send";
pub const PRODUCER_SEND_CLOSED: &str = "producer_send_closed";
pub const PRODUCER_CONGESTED: &str = "producer_congested";

pub const CONSUMER_RECEIVE: &str = "consumer_receive";
pub const CONSUMER_TIMEOUT: &str = "consumer_timeout";
pub const CONSUMER_EOS: &str = "consumer_eos";

pub const ELEMENT_STATE_CHANGE: &str = "element_state_change";
pub const ELEMENT_STATE_CHANGE_FAILED: &str = "element_state_change_failed";
pub const SOURCE_LOOP_START: &str = "source_loop_start";
pub const SOURCE_LOOP_STOP: &str = "source_loop_stop";
pub const SOURCE_PUSH: &str = "source_push";
