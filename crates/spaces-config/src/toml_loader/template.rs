//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Spaces session engine configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[presence]
# channel_prefix = "spaces:host:"
# request_timeout_ms = 10000   # 500-60000

[presence.realtime]
# project_ref = ""
# api_key = ""
# heartbeat_interval = 25      # 5-120
# reconnect_delay = 1          # 1-60
# max_reconnect_delay = 30     # 1-600

[join]
# capacity = 1                 # non-host participants, 1-8
# room_id_timeout_secs = 30    # 5-300

[recording]
# ceiling_secs = 420           # 30-3600
# tick_ms = 1000               # 100-5000
# min_peers = 2                # 2-16
# max_retries = 3              # 1-10
# retry_base_delay_ms = 1000   # 50-30000
# jitter_min = 0.8
# jitter_max = 1.2
# fresh_age_expected_secs = 60
# fresh_age_secs = 300
# tag = "conversation"
# visibility = "public"        # public | private

[speaker]
# single_threshold = 0.001     # 0.0-1.0
# both_threshold = 0.0003      # 0.0-single_threshold
# smoothing = 0.5              # 0.0-1.0

[services]
# token_endpoint = "http://localhost:8787/api/token"
# api_base_url = "http://localhost:8787/v2"
# management_token_ttl_secs = 3600
# request_timeout_secs = 15

[logging]
# level = "info"               # trace | debug | info | warn | error
"##
    .to_string()
}
