/// End-to-end tests: build dual-interpretation files with the flate2 codec,
/// read them back, and check what each kind of decoder would see.
use twinpng_core::checksum::chunk_crc;
use twinpng_core::filter::{filter, validate};
use twinpng_core::stored::EMPTY_STORED;
use twinpng_core::{
    compress_to_size, decode_file, BuiltImage, Codec, Container, Error, FlateCodec, PackOptions,
    PixelSource, Writer,
};

// ── helpers ───────────────────────────────────────────────────────────────

fn solid(width: u32, height: u32, rgb: [u8; 3]) -> PixelSource {
    let bytes = rgb
        .iter()
        .copied()
        .cycle()
        .take(width as usize * height as usize * 3)
        .collect();
    PixelSource::new(width, height, bytes).unwrap()
}

/// Every row a different solid colour, so each row costs a few compressed
/// bytes and tall pieces stop fitting.
fn banded(width: u32, height: u32, mul: [u32; 3]) -> PixelSource {
    let mut bytes = Vec::with_capacity(width as usize * height as usize * 3);
    for row in 0..height {
        let rgb = mul.map(|m| (row.wrapping_mul(m) + 17) as u8);
        for _ in 0..width {
            bytes.extend_from_slice(&rgb);
        }
    }
    PixelSource::new(width, height, bytes).unwrap()
}

/// Each row repeats its own 40 pseudo-random bytes. One row compresses into
/// a segment, two rows together do not.
fn noisy(width: u32, height: u32, seed: u32) -> PixelSource {
    let mut state = seed | 1;
    let mut bytes = Vec::with_capacity(width as usize * height as usize * 3);
    for _ in 0..height {
        let block: Vec<u8> = (0..40)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state >> 24) as u8
            })
            .collect();
        bytes.extend(block.iter().copied().cycle().take(width as usize * 3));
    }
    PixelSource::new(width, height, bytes).unwrap()
}

fn compressible_bytes(len: usize) -> Vec<u8> {
    let pattern = b"the quick brown fox jumps over the lazy dog. ";
    (0..len).map(|i| pattern[i % pattern.len()]).collect()
}

/// Check that every piece's rows show up where each reading should put them:
/// image B at standard row `r + 2`, image A at restart row `r`.
fn assert_rows_land(built: &BuiltImage, a: &PixelSource, b: &PixelSource) {
    let codec = FlateCodec::default();
    let container = Container::parse(&built.bytes).unwrap();
    let decoded = container.decode(&codec).unwrap();
    let row_len = built.header.row_len();
    let a_rows = filter(a);
    let b_rows = filter(b);

    for piece in &built.pieces {
        let (start, end) = (piece.start_row as usize, piece.end_row() as usize);
        assert_eq!(
            &decoded.standard[(start + 2) * row_len..(end + 2) * row_len],
            b_rows.rows(piece.start_row, piece.end_row()),
            "standard reading, image B rows {start}..{end}"
        );
        assert_eq!(
            &decoded.restart_second[start * row_len..end * row_len],
            a_rows.rows(piece.start_row, piece.end_row()),
            "restart reading, image A rows {start}..{end}"
        );
    }
}

// ── exact-size compression ────────────────────────────────────────────────

#[test]
fn segment_has_exact_length_and_round_trips() {
    let codec = FlateCodec::default();
    let payload = compressible_bytes(600);
    for target in [120, 161, 200, 333] {
        let segment = compress_to_size(&codec, &payload, target).unwrap();
        assert_eq!(segment.len(), target);
        assert_eq!(&segment.as_bytes()[..5], &EMPTY_STORED);
        assert!(segment.tail_len() >= 1);

        let inflated = codec.inflate(segment.as_bytes()).unwrap();
        assert_eq!(inflated.data, payload, "target {target}");
        assert!(!inflated.finished);
    }
}

#[test]
fn segment_too_small_is_unachievable() {
    let codec = FlateCodec::default();
    let payload = compressible_bytes(50);
    assert!(matches!(
        compress_to_size(&codec, &payload, 12),
        Err(Error::SizeUnachievable {
            payload_len: 50,
            target: 12
        })
    ));
    // A single byte has no split point at all.
    assert!(matches!(
        compress_to_size(&codec, b"x", 500),
        Err(Error::SizeUnachievable { .. })
    ));
}

// ── building ──────────────────────────────────────────────────────────────

#[test]
fn red_and_blue_build_and_decode() {
    let codec = FlateCodec::default();
    let red = solid(32, 6, [0xff, 0, 0]);
    let blue = solid(32, 6, [0, 0, 0xff]);
    let built = Writer::new(&codec).build(&red, &blue).unwrap();

    let row_len = 32 * 3 + 1;
    let covered = built.pieces.last().unwrap().end_row();
    assert!(covered <= 6);
    assert_eq!(built.header.width, 32);
    assert_eq!(built.header.height, covered + 2);
    assert_eq!(built.descriptor.first_height, 1);
    assert_eq!(built.descriptor.divided_height, 1);
    assert_eq!(built.descriptor.second_height, covered + 1);
    assert_eq!(built.descriptor.total_height(), built.header.height as u64);
    // iDOT (40) + first IDAT framing (12) + zlib header (2) + prefix.
    assert_eq!(
        built.descriptor.restart_offset as usize,
        40 + 12 + 2 + (5 + row_len + 5)
    );

    let container = Container::parse(&built.bytes).unwrap();
    let decoded = container.decode(&codec).unwrap();
    validate(&decoded.standard, 32).unwrap();
    validate(&decoded.restart_second, 32).unwrap();
    assert_eq!(decoded.restart_first, vec![0u8; row_len]);
    assert_eq!(decoded.standard.len(), built.header.height as usize * row_len);

    assert_rows_land(&built, &red, &blue);
}

#[test]
fn tall_banded_images_need_several_pieces() {
    let codec = FlateCodec::default();
    let a = banded(32, 64, [37, 11, 3]);
    let b = banded(32, 64, [13, 7, 29]);
    let built = Writer::new(&codec).build(&a, &b).unwrap();

    assert!(built.pieces.len() > 1, "pieces: {:?}", built.pieces);
    for pair in built.pieces.windows(2) {
        assert_eq!(pair[1].start_row, pair[0].end_row() + 1);
    }
    assert!(built.pieces.iter().all(|p| p.height >= 1));
    assert_eq!(built.pieces[0].start_row, 0);

    assert_rows_land(&built, &a, &b);
}

#[test]
fn incompressible_pairs_fall_back_to_single_rows() {
    let codec = FlateCodec::default();
    let a = noisy(32, 8, 0x2545_f491);
    let b = noisy(32, 8, 0x9e37_79b9);
    let built = Writer::new(&codec).build(&a, &b).unwrap();

    let starts: Vec<u32> = built.pieces.iter().map(|p| p.start_row).collect();
    assert_eq!(starts, [0, 2, 4, 6]);
    assert!(built.pieces.iter().all(|p| p.height == 1), "{:?}", built.pieces);
    assert_eq!(built.header.height, 9);
    assert_eq!(built.descriptor.second_height, 8);

    Container::parse(&built.bytes)
        .unwrap()
        .decode(&codec)
        .unwrap();
    assert_rows_land(&built, &a, &b);
}

#[test]
fn serial_and_parallel_search_agree() {
    let codec = FlateCodec::default();
    let a = banded(24, 40, [5, 91, 17]);
    let b = banded(24, 40, [71, 3, 43]);
    let parallel = Writer::new(&codec)
        .with_options(PackOptions { parallel: true })
        .build(&a, &b)
        .unwrap();
    let serial = Writer::new(&codec)
        .with_options(PackOptions { parallel: false })
        .build(&a, &b)
        .unwrap();
    assert_eq!(parallel.pieces, serial.pieces);
    assert_eq!(parallel.bytes, serial.bytes);
}

#[test]
fn restart_offset_lands_on_a_stored_block() {
    let codec = FlateCodec::default();
    let a = banded(20, 12, [3, 5, 7]);
    let b = solid(20, 12, [9, 9, 9]);
    let built = Writer::new(&codec).build(&a, &b).unwrap();

    let container = Container::parse(&built.bytes).unwrap();
    let (descriptor, idot_offset) = container.restart.unwrap();
    let target = idot_offset + descriptor.restart_offset as usize;
    assert_eq!(&built.bytes[target + 4..target + 8], b"IDAT");

    let (_, split) = container.restart_split().unwrap();
    let stream = container.zlib_stream();
    assert_eq!(&stream[split..split + 5], &EMPTY_STORED);

    // Decoded in isolation from there, the stream opens with a valid row.
    let inflated = codec.inflate(&stream[split..]).unwrap();
    let row_len = built.header.row_len();
    assert!(inflated.data.len() >= row_len);
    validate(&inflated.data[..row_len], 20).unwrap();
}

#[test]
fn write_then_decode_file() {
    let codec = FlateCodec::new(6);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("twin.png");
    let a = solid(16, 10, [10, 200, 30]);
    let b = banded(16, 10, [1, 2, 3]);

    let built = Writer::new(&codec).write(&path, &a, &b).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), built.bytes);

    let decoded = decode_file(&codec, &path).unwrap();
    assert_eq!(decoded.header, built.header);
    assert_eq!(decoded.descriptor, built.descriptor);
}

// ── failures ──────────────────────────────────────────────────────────────

#[test]
fn dimension_mismatch_writes_nothing() {
    let codec = FlateCodec::default();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("never.png");
    let result = Writer::new(&codec).write(
        &path,
        &solid(32, 6, [1, 2, 3]),
        &solid(32, 7, [1, 2, 3]),
    );
    assert!(matches!(
        result,
        Err(Error::DimensionMismatch {
            a_height: 6,
            b_height: 7,
            ..
        })
    ));
    assert!(!path.exists());
}

#[test]
fn four_pixel_rows_are_too_narrow() {
    // A 13-byte row leaves 8 bytes per segment, less than two stored headers.
    let codec = FlateCodec::default();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("narrow.png");
    let result = Writer::new(&codec).write(
        &path,
        &solid(4, 6, [0xff, 0, 0]),
        &solid(4, 6, [0, 0, 0xff]),
    );
    assert!(matches!(result, Err(Error::SizeUnachievable { target: 8, .. })));
    assert!(!path.exists());
}

#[test]
fn corrupted_chunk_is_rejected() {
    let codec = FlateCodec::default();
    let built = Writer::new(&codec)
        .build(&solid(32, 6, [0xff, 0, 0]), &solid(32, 6, [0, 0, 0xff]))
        .unwrap();
    let mut bytes = built.bytes.clone();
    let last_idat_byte = bytes.len() - 12 - 4 - 1;
    bytes[last_idat_byte] ^= 0x40;
    assert!(matches!(
        Container::parse(&bytes),
        Err(Error::ChunkCrc { ref kind, .. }) if kind == "IDAT"
    ));
}

#[test]
fn wrong_trailer_is_rejected() {
    let codec = FlateCodec::default();
    let built = Writer::new(&codec)
        .build(&solid(32, 6, [0xff, 0, 0]), &solid(32, 6, [0, 0, 0xff]))
        .unwrap();

    let mut bytes = built.bytes.clone();
    let offset = Container::parse(&bytes).unwrap().data_chunks[1].offset;
    let len = u32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
    let body = offset + 8..offset + 8 + len;
    bytes[body.end - 1] ^= 0x01;
    let crc = chunk_crc(b"IDAT", &bytes[body.clone()]);
    bytes[body.end..body.end + 4].copy_from_slice(&crc.to_be_bytes());

    let container = Container::parse(&bytes).unwrap();
    assert!(matches!(
        container.decode(&codec),
        Err(Error::RoundTripMismatch {
            stage: "zlib trailer",
            ..
        })
    ));
}
