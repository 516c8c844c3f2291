//! Receivers of completed PID responses.
//!
//! A request hands its reassembled payload to every registered
//! [`PidConsumer`] once per successful polling cycle. Triggers usually take
//! the raw bytes (any `FnMut(&[u8])` closure is a consumer); sensors decode a
//! value first and publish it. Decoding is owned by the consumer, never by the
//! polling core.

/// Maximum number of bytes an [`IndexedValue`] combines.
pub const MAX_VALUE_INDEXES: usize = 4;

/// Capability shared by triggers and sensors.
pub trait PidConsumer {
    /// Called with the full response buffer of a completed polling cycle.
    fn deliver(&mut self, data: &[u8]);
}

impl<F: FnMut(&[u8])> PidConsumer for F {
    fn deliver(&mut self, data: &[u8]) {
        self(data)
    }
}

//==================================================================================DECODERS
/// Turns a response payload into a domain value.
pub trait Decode {
    type Output;
    /// `None` when the payload does not contain what the decoder expects.
    fn decode(&self, data: &[u8]) -> Option<Self::Output>;
}

impl<T, F: Fn(&[u8]) -> Option<T>> Decode for F {
    type Output = T;

    fn decode(&self, data: &[u8]) -> Option<T> {
        self(data)
    }
}

/// Big-endian combination of up to four payload bytes picked by index.
///
/// With `signed`, the first selected byte is read as `i8` so the result keeps
/// its sign (e.g. fuel trims, temperatures reported as offsets).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IndexedValue {
    indexes: [usize; MAX_VALUE_INDEXES],
    count: usize,
    signed: bool,
}

impl IndexedValue {
    /// `None` when `indexes` is empty or longer than [`MAX_VALUE_INDEXES`].
    pub fn new(indexes: &[usize], signed: bool) -> Option<Self> {
        if indexes.is_empty() || indexes.len() > MAX_VALUE_INDEXES {
            return None;
        }
        let mut slots = [0usize; MAX_VALUE_INDEXES];
        slots[..indexes.len()].copy_from_slice(indexes);
        Some(Self {
            indexes: slots,
            count: indexes.len(),
            signed,
        })
    }

    /// Selected byte positions, most significant first.
    pub fn indexes(&self) -> &[usize] {
        &self.indexes[..self.count]
    }
}

impl Decode for IndexedValue {
    type Output = f32;

    fn decode(&self, data: &[u8]) -> Option<f32> {
        let (first, rest) = self.indexes().split_first()?;
        let head = *data.get(*first)?;
        let mut value: i64 = if self.signed {
            head as i8 as i64
        } else {
            head as i64
        };
        for index in rest {
            value = (value << 8) | *data.get(*index)? as i64;
        }
        Some(value as f32)
    }
}

/// Boolean read from one payload byte: set when every bit of `mask` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MaskedFlag {
    pub index: usize,
    pub mask: u8,
}

impl MaskedFlag {
    pub const fn new(index: usize, mask: u8) -> Self {
        Self { index, mask }
    }
}

impl Decode for MaskedFlag {
    type Output = bool;

    fn decode(&self, data: &[u8]) -> Option<bool> {
        data.get(self.index)
            .map(|byte| byte & self.mask == self.mask)
    }
}

//==================================================================================SENSORS
/// Consumer decoding the payload and publishing the value.
///
/// Payloads the decoder rejects are skipped: nothing is published for that cycle.
pub struct Sensor<D, P> {
    decoder: D,
    publish: P,
}

/// Sensor publishing a flag read with a [`MaskedFlag`].
pub type BinarySensor<P> = Sensor<MaskedFlag, P>;

impl<D, P> Sensor<D, P>
where
    D: Decode,
    P: FnMut(D::Output),
{
    pub fn new(decoder: D, publish: P) -> Self {
        Self { decoder, publish }
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }
}

impl<D, P> PidConsumer for Sensor<D, P>
where
    D: Decode,
    P: FnMut(D::Output),
{
    fn deliver(&mut self, data: &[u8]) {
        match self.decoder.decode(data) {
            Some(value) => (self.publish)(value),
            None => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Sensor could not decode {} byte payload", data.len());
            }
        }
    }
}
