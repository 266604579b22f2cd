//! Conversation side of QuestPal: the hunt engine and everything it needs to
//! talk to a chat.
//!
//! - [`hunt`] drives the quest-hunt flow for each chat
//! - [`router`] turns Telegram updates into engine calls
//! - [`sessions`] holds per-chat state
//! - [`texts`] and [`keyboards`] render what the user sees
//! - [`geocode`] and [`clock`] are the engine's outside inputs

pub mod clock;
pub mod geocode;
pub mod hunt;
pub mod keyboards;
pub mod router;
pub mod sessions;
pub mod texts;

pub use clock::{Clock, FixedClock, SystemClock};
pub use geocode::{GeocodeError, Geocoder, NominatimGeocoder, StaticGeocoder};
pub use hunt::{EngineServices, HuntEngine, HuntSettings, LocationInput};
pub use router::HuntRouter;
pub use sessions::{ChatState, Presentation, SessionRegistry};
