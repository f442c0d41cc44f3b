//! Little-endian decoding of raw remote bytes.

/// Fixed-size value that can be decoded from (and encoded to) little-endian bytes.
pub trait Pod: Sized + Copy + Send + Sync + 'static {
    const SIZE: usize;

    fn from_le_slice(bytes: &[u8]) -> Option<Self>;

    fn to_le_vec(self) -> Vec<u8>;
}

macro_rules! impl_pod {
    ($($t:ty),* $(,)?) => {
        $(
            impl Pod for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn from_le_slice(bytes: &[u8]) -> Option<Self> {
                    let raw = bytes.get(..Self::SIZE)?.try_into().ok()?;
                    Some(<$t>::from_le_bytes(raw))
                }

                fn to_le_vec(self) -> Vec<u8> {
                    self.to_le_bytes().to_vec()
                }
            }
        )*
    };
}

impl_pod!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Pod for bool {
    const SIZE: usize = 1;

    fn from_le_slice(bytes: &[u8]) -> Option<Self> {
        bytes.first().map(|b| *b != 0)
    }

    fn to_le_vec(self) -> Vec<u8> {
        vec![u8::from(self)]
    }
}

/// Borrowed view over a block of remote bytes with offset-based accessors.
#[derive(Debug, Clone, Copy)]
pub struct ByteBuffer<'a> {
    data: &'a [u8],
}

impl<'a> ByteBuffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn value_at<T: Pod>(&self, offset: usize) -> Option<T> {
        T::from_le_slice(self.data.get(offset..)?)
    }

    pub fn i32_at(&self, offset: usize) -> Option<i32> {
        self.value_at(offset)
    }

    pub fn u64_at(&self, offset: usize) -> Option<u64> {
        self.value_at(offset)
    }

    pub fn slice(&self, offset: usize, len: usize) -> Option<&'a [u8]> {
        self.data.get(offset..offset.checked_add(len)?)
    }

    /// Iterate fixed-stride records, dropping a trailing partial record.
    pub fn records(&self, stride: usize) -> impl Iterator<Item = ByteBuffer<'a>> + 'a {
        let data = self.data;
        data.chunks_exact(stride.max(1)).map(ByteBuffer::new)
    }
}

/// Decode UTF-16LE code units, stopping at the first NUL.
pub fn decode_utf16(bytes: &[u8]) -> String {
    let (decoded, _, _) = encoding_rs::UTF_16LE.decode(bytes);
    match decoded.find('\0') {
        Some(end) => decoded[..end].to_string(),
        None => decoded.into_owned(),
    }
}

/// Decode a NUL-terminated UTF-8 buffer; bytes after the terminator are ignored.
pub fn decode_cstr(bytes: &[u8]) -> String {
    let end = memchr::memchr(0, bytes).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
