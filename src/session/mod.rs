// =============================================================================
// Session layer — one user's command pipe
// =============================================================================
//
// frames.rs     wire format of the bidirectional message pipe
// outbound.rs   single-writer fan-in: every outbound frame goes through here
// commands.rs   slash-command grammar and argument validation
// dispatcher.rs routing from parsed commands to engine operations

pub mod commands;
pub mod dispatcher;
pub mod frames;
pub mod outbound;
