/// Feed Sim - Options Market Data Decoder and Book Simulator
///
/// Decodes captured NASDAQ ITTO, BATS PITCH and MIAX TOM traffic and replays
/// it through an order-book simulator. Features include:
/// - Multi-layer packet decoding with recycled layer instances
/// - MoldUDP64, SoupBinTCP, BSU, Mach and SesM session framings
/// - Per-session sequencing and gap detection
/// - Order database and aggregated price-level books
/// - Subscription filtering and replay statistics

pub mod protocol;
pub mod packet;
pub mod decoder;
pub mod capture;
pub mod gap_detector;
pub mod session;
pub mod processor;
pub mod subscr;
pub mod operation;
pub mod order_db;
pub mod book;
pub mod sim;
pub mod stats;
pub mod config;

pub use protocol::{OptionId, OrderId, Price, PriceLevel, Side, Size};
pub use packet::{DecodeError, EndpointRule, Layer, LayerType, Message, Transport};
pub use decoder::{DecodedLayer, DecodedPacket, Decoder, LayerRegistry};
pub use capture::{CaptureError, CaptureSource, MemorySource, Packet, PcapFile, PcapReader, PcapWriter};
pub use gap_detector::GapDetector;
pub use session::{Flow, SessionId, SessionTable};
pub use processor::{
    CopyingProcessor, Handler, HandlerError, MessageEvent, PacketProcessor, ProcessorError, ReusingProcessor,
    RunSummary,
};
pub use subscr::Subscription;
pub use operation::{Operation, Order, Top};
pub use order_db::{Applied, OrderDb};
pub use book::{Book, BookKey, Touched};
pub use sim::{Observer, SimError, Simulator};
pub use stats::{FeedSnapshot, FeedStats, LatencyStats, LatencyWindow};
pub use config::SimConfig;
