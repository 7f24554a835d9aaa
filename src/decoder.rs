/// Multi-layer decode engine
///
/// Decodes one captured packet into a flat list of layers, each remembering
/// its parent and its position among its parent's children. Layer instances
/// come from per-type free lists and return there when the `DecodedPacket`
/// guard is dropped, so a steady-state replay allocates nothing per packet.

use crate::packet::{
    DecodeError, EndpointRule, EndpointTable, FailureLayer, Layer, LayerType, NextLayers, Span,
};
use std::ops::{Deref, Range};
use tracing::debug;

pub type LayerFactory = fn() -> Layer;

/// Immutable table of layer factories, one slot per `LayerType`
#[derive(Clone)]
pub struct LayerRegistry {
    factories: [Option<LayerFactory>; LayerType::COUNT],
}

const STANDARD_LAYERS: [(LayerType, LayerFactory); 14] = [
    (LayerType::Ethernet, || Layer::new(LayerType::Ethernet)),
    (LayerType::Dot1Q, || Layer::new(LayerType::Dot1Q)),
    (LayerType::Ipv4, || Layer::new(LayerType::Ipv4)),
    (LayerType::Udp, || Layer::new(LayerType::Udp)),
    (LayerType::Tcp, || Layer::new(LayerType::Tcp)),
    (LayerType::MoldUdp64, || Layer::new(LayerType::MoldUdp64)),
    (LayerType::SoupBinTcp, || Layer::new(LayerType::SoupBinTcp)),
    (LayerType::Bsu, || Layer::new(LayerType::Bsu)),
    (LayerType::Mach, || Layer::new(LayerType::Mach)),
    (LayerType::SesM, || Layer::new(LayerType::SesM)),
    (LayerType::Itto, || Layer::new(LayerType::Itto)),
    (LayerType::Pitch, || Layer::new(LayerType::Pitch)),
    (LayerType::Tom, || Layer::new(LayerType::Tom)),
    (LayerType::Payload, || Layer::new(LayerType::Payload)),
];

impl LayerRegistry {
    pub fn empty() -> Self {
        LayerRegistry {
            factories: [None; LayerType::COUNT],
        }
    }

    /// Every layer the crate implements
    pub fn standard() -> Self {
        STANDARD_LAYERS
            .iter()
            .fold(Self::empty(), |reg, &(t, f)| reg.register(t, f))
    }

    pub fn register(mut self, t: LayerType, factory: LayerFactory) -> Self {
        self.factories[t.index()] = Some(factory);
        self
    }

    pub fn create(&self, t: LayerType) -> Result<Layer, DecodeError> {
        self.factories[t.index()]
            .map(|f| f())
            .ok_or(DecodeError::Unregistered(t))
    }

    pub fn is_registered(&self, t: LayerType) -> bool {
        self.factories[t.index()].is_some()
    }
}

impl Default for LayerRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Instances built by a factory
    pub created: u64,
    /// Instances taken from a free list
    pub reused: u64,
    /// Spans replaced by a failure placeholder
    pub failures: u64,
}

/// One entry of a decoded packet
#[derive(Debug)]
pub struct DecodedLayer {
    pub layer: Layer,
    pub parent: Option<usize>,
    /// Position among the parent's children, in decode order
    pub ordinal: usize,
    /// Absolute byte range in the packet
    pub span: Range<usize>,
}

pub struct Decoder {
    registry: LayerRegistry,
    endpoints: EndpointTable,
    free: Vec<Vec<Layer>>,
    pending: Vec<Span>,
    decoded: Vec<DecodedLayer>,
    child_counts: Vec<usize>,
    stats: DecoderStats,
}

impl Decoder {
    pub fn new(registry: LayerRegistry) -> Self {
        Decoder {
            registry,
            endpoints: EndpointTable::new(),
            free: (0..LayerType::COUNT).map(|_| Vec::new()).collect(),
            pending: Vec::with_capacity(16),
            decoded: Vec::with_capacity(16),
            child_counts: Vec::with_capacity(16),
            stats: DecoderStats::default(),
        }
    }

    /// "Payload of `rule.transport` traffic on `rule.port` is `rule.layer`"
    pub fn add_endpoint(&mut self, rule: EndpointRule) {
        self.endpoints.add(rule);
    }

    pub fn endpoints(&self) -> &EndpointTable {
        &self.endpoints
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Instances of `t` currently parked on its free list
    pub fn pooled(&self, t: LayerType) -> usize {
        self.free[t.index()].len()
    }

    /// Decode `data` starting with a `root` layer spanning the whole buffer.
    pub fn decode<'d>(&'d mut self, root: LayerType, data: &'d [u8]) -> DecodedPacket<'d> {
        self.pending.clear();
        self.pending.push(Span {
            layer: root,
            range: 0..data.len(),
            parent: None,
        });

        let mut head = 0;
        while head < self.pending.len() {
            let span = self.pending[head].clone();
            head += 1;

            let index = self.decoded.len();
            let ordinal = match span.parent {
                Some(p) => {
                    let count = &mut self.child_counts[p];
                    *count += 1;
                    *count - 1
                }
                None => 0,
            };
            self.child_counts.push(0);

            let bytes = &data[span.range.clone()];
            let mark = self.pending.len();
            let layer = match self.acquire(span.layer) {
                Ok(mut layer) => {
                    let result = {
                        let mut next = NextLayers::new(
                            &mut self.pending,
                            &self.endpoints,
                            span.range.start,
                            Some(index),
                            span.parent,
                        );
                        layer.decode(bytes, &mut next)
                    };
                    match result {
                        Ok(()) => layer,
                        Err(e) => {
                            self.pending.truncate(mark);
                            self.release(layer);
                            self.failure(span.layer, e, bytes.len())
                        }
                    }
                }
                Err(e) => self.failure(span.layer, e, bytes.len()),
            };

            self.decoded.push(DecodedLayer {
                layer,
                parent: span.parent,
                ordinal,
                span: span.range,
            });
        }
        self.pending.clear();

        DecodedPacket {
            decoder: self,
            data,
        }
    }

    fn acquire(&mut self, t: LayerType) -> Result<Layer, DecodeError> {
        if let Some(layer) = self.free[t.index()].pop() {
            self.stats.reused += 1;
            return Ok(layer);
        }
        let layer = self.registry.create(t)?;
        self.stats.created += 1;
        Ok(layer)
    }

    fn release(&mut self, layer: Layer) {
        self.free[layer.layer_type().index()].push(layer);
    }

    fn failure(&mut self, failed: LayerType, error: DecodeError, len: usize) -> Layer {
        debug!(layer = ?failed, %error, len, "span decode failed");
        self.stats.failures += 1;
        match self.free[LayerType::Failure.index()].pop() {
            Some(Layer::Failure(mut f)) => {
                f.failed = failed;
                f.error = Some(error);
                f.len = len;
                Layer::Failure(f)
            }
            _ => Layer::Failure(FailureLayer {
                failed,
                error: Some(error),
                len,
            }),
        }
    }

    fn recycle(&mut self) {
        while let Some(entry) = self.decoded.pop() {
            self.free[entry.layer.layer_type().index()].push(entry.layer);
        }
        self.child_counts.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(LayerRegistry::standard())
    }
}

/// Nearest ancestor of `layers[index]` (excluding itself) matching `pred`
pub fn ancestor(layers: &[DecodedLayer], index: usize, pred: impl Fn(&Layer) -> bool) -> Option<usize> {
    let mut cur = layers[index].parent;
    while let Some(i) = cur {
        if pred(&layers[i].layer) {
            return Some(i);
        }
        cur = layers[i].parent;
    }
    None
}

/// Layers of one packet. Dropping the guard returns every instance to the
/// decoder's free lists.
pub struct DecodedPacket<'d> {
    decoder: &'d mut Decoder,
    data: &'d [u8],
}

impl<'d> DecodedPacket<'d> {
    /// Raw bytes covered by layer `index`
    pub fn bytes(&self, index: usize) -> &[u8] {
        &self.data[self.decoder.decoded[index].span.clone()]
    }

    /// Nearest ancestor of `index` (excluding itself) matching `pred`
    pub fn ancestor(&self, index: usize, pred: impl Fn(&Layer) -> bool) -> Option<usize> {
        ancestor(&self.decoder.decoded, index, pred)
    }

    pub fn has_failures(&self) -> bool {
        self.iter().any(|l| matches!(l.layer, Layer::Failure(_)))
    }
}

impl Deref for DecodedPacket<'_> {
    type Target = [DecodedLayer];

    fn deref(&self) -> &[DecodedLayer] {
        &self.decoder.decoded
    }
}

impl Drop for DecodedPacket<'_> {
    fn drop(&mut self) {
        self.decoder.recycle();
    }
}
