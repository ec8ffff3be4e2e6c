use badge_core::link::Side;
use badge_core::network::{MessageDisposition, NetworkListener};

use crate::status;

/// Logs session events and counts them in the shared status block.
pub struct StatusListener;

impl NetworkListener for StatusListener {
    fn on_disconnected(&mut self) {
        defmt::info!("badge: left the chain");
        status::record_disconnection();
    }

    fn on_pairing_begin(&mut self) {
        defmt::info!("badge: pairing");
    }

    fn on_pairing_end(&mut self, peer_id: u8, peer_count: u8) {
        defmt::info!("badge: paired as {} of {}", peer_id, peer_count);
        status::record_pairing();
    }

    fn on_message_received(&mut self, origin: Side, kind: u8, payload: &[u8]) -> MessageDisposition {
        defmt::info!("badge: type {} from {}: {:x}", kind, origin, payload);
        status::record_message();
        MessageDisposition::Forward
    }
}
