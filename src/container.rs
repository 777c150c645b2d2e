
//! The riff chunk structure that wraps every webp bitstream,
//! and the extended header, animation header and animation frame records stored in it.

use bit_field::BitField;
use log::debug;
use crate::error::*;
use crate::io::*;
use crate::math::Vec2;


/// Four ascii bytes identifying a chunk.
pub type FourCC = [u8; 4];

/// Signature at the very start of the file.
pub const RIFF: FourCC = *b"RIFF";

/// The only form type this crate reads.
pub const WEBP: FourCC = *b"WEBP";

/// Lossy bitstream.
pub const VP8: FourCC = *b"VP8 ";

/// Lossless bitstream.
pub const VP8L: FourCC = *b"VP8L";

/// Extended format header.
pub const VP8X: FourCC = *b"VP8X";

/// Alpha plane for a lossy bitstream.
pub const ALPH: FourCC = *b"ALPH";

/// Global animation parameters.
pub const ANIM: FourCC = *b"ANIM";

/// A single animation frame, containing nested chunks.
pub const ANMF: FourCC = *b"ANMF";

const CHUNK_HEADER_SIZE: usize = 8;


/// A tagged payload inside the container.
/// The payload excludes the padding byte of odd-length chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'b> {

    /// The four character tag.
    pub tag: FourCC,

    /// The payload bytes, exactly as long as the declared length.
    pub data: &'b [u8],
}

impl Chunk<'_> {

    /// The tag as text, for diagnostics.
    pub fn tag_name(&self) -> String {
        String::from_utf8_lossy(&self.tag).into_owned()
    }
}


/// Walks a list of chunks, either the top level list of a riff file
/// or the nested list inside an animation frame.
#[derive(Debug, Clone)]
pub struct ChunkReader<'b> {
    form_type: FourCC,
    remaining: &'b [u8],
    padded: bool,
}

impl<'b> ChunkReader<'b> {

    /// Validate the riff signature, declared size and form type.
    /// Bytes after the declared riff size are ignored.
    pub fn new(bytes: &'b [u8]) -> Result<Self> {
        if bytes.len() < CHUNK_HEADER_SIZE || bytes[.. 4] != RIFF {
            return Err(Error::invalid(MISSING_HEADER));
        }

        let mut size_bytes = &bytes[4 .. 8];
        let size = u32_to_usize(u32::read(&mut size_bytes)?, SHORT_PAYLOAD)?;

        if size < 4 || bytes.len() < 12 {
            return Err(Error::invalid(SHORT_PAYLOAD));
        }

        let payload_end = 12 + (size - 4);
        if payload_end > bytes.len() {
            return Err(Error::invalid(SHORT_PAYLOAD));
        }

        let mut form_type = [0; 4];
        form_type.copy_from_slice(&bytes[8 .. 12]);

        Ok(ChunkReader { form_type, remaining: &bytes[12 .. payload_end], padded: false })
    }

    /// Walk a headerless list of chunks, as found in the payload of an animation frame.
    pub fn list(form_type: FourCC, bytes: &'b [u8]) -> Self {
        ChunkReader { form_type, remaining: bytes, padded: false }
    }

    /// The form type declared in the riff header.
    pub fn form_type(&self) -> FourCC {
        self.form_type
    }

    /// Return the next chunk, or `None` when the list is exhausted.
    /// Skips the padding byte that follows an odd-length chunk.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk<'b>>> {
        if self.padded {
            if self.remaining.is_empty() {
                return Err(Error::invalid(CHUNK_TOO_LONG));
            }

            self.remaining = &self.remaining[1..];
            self.padded = false;
        }

        if self.remaining.is_empty() {
            return Ok(None);
        }

        if self.remaining.len() < CHUNK_HEADER_SIZE {
            return Err(Error::invalid(SHORT_CHUNK_HEADER));
        }

        let mut header = take_n(&mut self.remaining, CHUNK_HEADER_SIZE)?;
        let mut tag = [0; 4];
        u8::read_slice(&mut header, &mut tag)?;
        let length = u32_to_usize(u32::read(&mut header)?, CHUNK_TOO_LONG)?;

        if length > self.remaining.len() {
            return Err(Error::invalid(CHUNK_TOO_LONG));
        }

        let data = take_n(&mut self.remaining, length)?;
        self.padded = length & 1 == 1;

        let chunk = Chunk { tag, data };
        debug!("chunk {:?} with {} bytes", chunk.tag_name(), length);
        Ok(Some(chunk))
    }
}

impl<'b> Iterator for ChunkReader<'b> {
    type Item = Result<Chunk<'b>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}


/// Collects chunks and wraps them into a riff file.
#[derive(Debug, Clone, Default)]
pub struct ChunkWriter {
    payload: Vec<u8>,
}

impl ChunkWriter {

    /// A writer without any chunks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk, followed by a zero byte if the data has odd length.
    pub fn write_chunk(&mut self, tag: FourCC, data: &[u8]) -> UnitResult {
        u8::write_slice(&mut self.payload, &tag)?;
        usize_to_u32(data.len(), CHUNK_TOO_LONG)?.write(&mut self.payload)?;
        u8::write_slice(&mut self.payload, data)?;

        if data.len() & 1 == 1 {
            0_u8.write(&mut self.payload)?;
        }

        Ok(())
    }

    /// The concatenated chunks without any riff header, as nested inside an animation frame.
    pub fn into_list(self) -> Vec<u8> {
        self.payload
    }

    /// Prepend the riff signature, size and form type.
    pub fn finish(self, form_type: FourCC) -> Result<Vec<u8>> {
        let mut file = Vec::with_capacity(12 + self.payload.len());
        u8::write_slice(&mut file, &RIFF)?;
        usize_to_u32(4 + self.payload.len(), SHORT_PAYLOAD)?.write(&mut file)?;
        u8::write_slice(&mut file, &form_type)?;
        u8::write_slice(&mut file, &self.payload)?;
        Ok(file)
    }
}


/// Feature flags of the extended format header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtendedFlags {

    /// The file contains animation frames.
    pub animation: bool,

    /// Some image in the file contains transparency.
    pub alpha: bool,

    /// An icc color profile chunk is present.
    pub icc_profile: bool,

    /// An exif metadata chunk is present.
    pub exif: bool,

    /// An xmp metadata chunk is present.
    pub xmp: bool,
}

/// The payload of the `VP8X` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedHeader {

    /// Which optional features the file uses.
    pub flags: ExtendedFlags,

    /// Width and height of the canvas, each at most `1 << 24`.
    pub canvas_size: Vec2<usize>,
}

impl ExtendedHeader {

    /// The payload size of the chunk.
    pub const BYTE_SIZE: usize = 10;

    /// Largest canvas dimension that fits the 24 bit fields.
    pub const MAX_CANVAS_SIZE: usize = 1 << 24;

    /// Parse the chunk payload.
    pub fn read(mut data: &[u8]) -> Result<Self> {
        if data.len() != Self::BYTE_SIZE {
            return Err(Error::invalid("extended header size"));
        }

        let bits = u8::read(&mut data)?;
        let _reserved = read_u24(&mut data)?;
        let width = read_u24(&mut data)? as usize + 1;
        let height = read_u24(&mut data)? as usize + 1;

        let flags = ExtendedFlags {
            animation: bits.get_bit(1),
            xmp: bits.get_bit(2),
            exif: bits.get_bit(3),
            alpha: bits.get_bit(4),
            icc_profile: bits.get_bit(5),
        };

        Ok(ExtendedHeader { flags, canvas_size: Vec2(width, height) })
    }

    /// Serialize into a chunk payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.canvas_size.validate(Self::MAX_CANVAS_SIZE, "canvas size")?;

        let mut bits = 0_u8;
        bits.set_bit(1, self.flags.animation);
        bits.set_bit(2, self.flags.xmp);
        bits.set_bit(3, self.flags.exif);
        bits.set_bit(4, self.flags.alpha);
        bits.set_bit(5, self.flags.icc_profile);

        let mut bytes = Vec::with_capacity(Self::BYTE_SIZE);
        bits.write(&mut bytes)?;
        write_u24(&mut bytes, 0)?;
        write_u24(&mut bytes, (self.canvas_size.width() - 1) as u32)?;
        write_u24(&mut bytes, (self.canvas_size.height() - 1) as u32)?;
        Ok(bytes)
    }
}


/// The payload of the `ANIM` chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnimationHeader {

    /// Suggested canvas color in blue, green, red, alpha byte order.
    pub background_color: u32,

    /// How often the animation repeats, zero meaning forever.
    pub loop_count: u16,
}

impl AnimationHeader {

    /// The payload size of the chunk.
    pub const BYTE_SIZE: usize = 6;

    /// Parse the chunk payload.
    pub fn read(mut data: &[u8]) -> Result<Self> {
        if data.len() < Self::BYTE_SIZE {
            return Err(Error::invalid("animation header size"));
        }

        Ok(AnimationHeader {
            background_color: u32::read(&mut data)?,
            loop_count: u16::read(&mut data)?,
        })
    }

    /// Serialize into a chunk payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(Self::BYTE_SIZE);
        self.background_color.write(&mut bytes)?;
        self.loop_count.write(&mut bytes)?;
        Ok(bytes)
    }
}


/// The fixed part of an `ANMF` chunk, which is followed by nested chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {

    /// Position on the canvas. Both components are even.
    pub offset: Vec2<usize>,

    /// Size of the frame.
    pub size: Vec2<usize>,

    /// Display time in milliseconds, at most `(1 << 24) - 1`.
    pub duration: u32,

    /// Clear the frame area to the background color before showing the next frame.
    pub dispose_to_background: bool,

    /// Overwrite the canvas instead of alpha-blending onto it.
    pub skip_blending: bool,
}

impl FrameHeader {

    /// The size of the fixed fields.
    pub const BYTE_SIZE: usize = 16;

    /// The longest representable duration.
    pub const MAX_DURATION: u32 = (1 << 24) - 1;

    /// Parse the fixed fields and return the nested chunk bytes that follow them.
    pub fn read(mut data: &[u8]) -> Result<(Self, &[u8])> {
        if data.len() < Self::BYTE_SIZE {
            return Err(Error::invalid("animation frame header size"));
        }

        let x = read_u24(&mut data)? as usize * 2;
        let y = read_u24(&mut data)? as usize * 2;
        let width = read_u24(&mut data)? as usize + 1;
        let height = read_u24(&mut data)? as usize + 1;
        let duration = read_u24(&mut data)?;
        let bits = u8::read(&mut data)?;

        let header = FrameHeader {
            offset: Vec2(x, y),
            size: Vec2(width, height),
            duration,
            dispose_to_background: bits.get_bit(0),
            skip_blending: bits.get_bit(1),
        };

        Ok((header, data))
    }

    /// Serialize the fixed fields.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        self.size.validate(ExtendedHeader::MAX_CANVAS_SIZE, "frame size")?;

        let mut bits = 0_u8;
        bits.set_bit(0, self.dispose_to_background);
        bits.set_bit(1, self.skip_blending);

        write_u24(write, (self.offset.0 / 2) as u32)?;
        write_u24(write, (self.offset.1 / 2) as u32)?;
        write_u24(write, (self.size.width() - 1) as u32)?;
        write_u24(write, (self.size.height() - 1) as u32)?;
        write_u24(write, self.duration.min(Self::MAX_DURATION))?;
        bits.write(write)
    }
}


#[cfg(test)]
mod test {
    use super::*;

    fn riff(payload: &[u8]) -> Vec<u8> {
        let mut bytes = b"RIFF".to_vec();
        bytes.extend_from_slice(&(payload.len() as u32 + 4).to_le_bytes());
        bytes.extend_from_slice(b"WEBP");
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn walks_padded_chunks(){
        let mut payload = Vec::new();
        payload.extend_from_slice(b"ABCD\x03\x00\x00\x00xyz\x00");
        payload.extend_from_slice(b"EFGH\x02\x00\x00\x00pq");

        let bytes = riff(&payload);
        let mut reader = ChunkReader::new(&bytes).unwrap();
        assert_eq!(reader.form_type(), WEBP);

        let first = reader.next_chunk().unwrap().unwrap();
        assert_eq!(first, Chunk { tag: *b"ABCD", data: b"xyz" });

        let second = reader.next_chunk().unwrap().unwrap();
        assert_eq!(second, Chunk { tag: *b"EFGH", data: b"pq" });

        assert!(reader.next_chunk().unwrap().is_none());
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn rejects_bad_headers(){
        assert!(matches!(ChunkReader::new(b"RIF"), Err(Error::Invalid(message)) if message == MISSING_HEADER));
        assert!(matches!(ChunkReader::new(b"RIFX\x04\x00\x00\x00WEBP"), Err(Error::Invalid(message)) if message == MISSING_HEADER));
        assert!(matches!(ChunkReader::new(b"RIFF\x08\x00\x00\x00WEBP"), Err(Error::Invalid(message)) if message == SHORT_PAYLOAD));
        assert!(matches!(ChunkReader::new(b"RIFF\x02\x00\x00\x00WEBP"), Err(Error::Invalid(message)) if message == SHORT_PAYLOAD));
    }

    #[test]
    fn rejects_bad_chunks(){
        let bytes = riff(b"ABCD\x09\x00\x00\x00xyz");
        let mut reader = ChunkReader::new(&bytes).unwrap();
        assert!(matches!(reader.next_chunk(), Err(Error::Invalid(message)) if message == CHUNK_TOO_LONG));

        let bytes = riff(b"ABCD\x00\x00");
        let mut reader = ChunkReader::new(&bytes).unwrap();
        assert!(matches!(reader.next_chunk(), Err(Error::Invalid(message)) if message == SHORT_CHUNK_HEADER));

        let bytes = riff(b"ABCD\x01\x00\x00\x00x");
        let mut reader = ChunkReader::new(&bytes).unwrap();
        assert!(reader.next_chunk().unwrap().is_some());
        assert!(reader.next_chunk().is_err(), "missing padding byte");
    }

    #[test]
    fn writer_matches_reader(){
        let mut writer = ChunkWriter::new();
        writer.write_chunk(VP8L, &[1, 2, 3]).unwrap();
        writer.write_chunk(ALPH, &[4, 5]).unwrap();
        let bytes = writer.finish(WEBP).unwrap();

        assert_eq!(bytes.len(), 12 + 8 + 4 + 8 + 2);
        let chunks: Vec<_> = ChunkReader::new(&bytes).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(chunks, vec![ Chunk { tag: VP8L, data: &[1, 2, 3] }, Chunk { tag: ALPH, data: &[4, 5] } ]);
    }

    #[test]
    fn extended_header_fields(){
        let header = ExtendedHeader {
            flags: ExtendedFlags { alpha: true, animation: true, .. ExtendedFlags::default() },
            canvas_size: Vec2(640, 3),
        };

        let bytes = header.to_bytes().unwrap();
        assert_eq!(bytes, vec![0b0001_0010, 0, 0, 0, 0x7F, 0x02, 0, 0x02, 0, 0]);
        assert_eq!(ExtendedHeader::read(&bytes).unwrap(), header);
        assert!(ExtendedHeader::read(&bytes[.. 9]).is_err());
    }

    #[test]
    fn frame_header_fields(){
        let header = FrameHeader {
            offset: Vec2(4, 10), size: Vec2(3, 2), duration: 100,
            dispose_to_background: true, skip_blending: false,
        };

        let mut bytes = Vec::new();
        header.write(&mut bytes).unwrap();
        bytes.extend_from_slice(b"rest");

        let (parsed, rest) = FrameHeader::read(&bytes).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(rest, b"rest");
    }
}
