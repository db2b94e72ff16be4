//! rundfunk-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert alle Nachrichtentypen die zwischen Client und
//! Server ausgetauscht werden, sowie den laengenpraefixierten JSON-Codec.

pub mod control;
pub mod wire;

pub use control::{
    AbonnementAnfrage, ClientNachricht, FehlerAntwort, KanalAktion, KickOutFrame, PublishFrame,
    ServerNachricht, AKTION_ABMELDEN,
};
pub use wire::{ClientCodec, FrameCodec, ServerCodec};
