use image::RgbImage;

/// Assert that `bytes` is a decodable JPEG and return the decoded image.
pub fn assert_decodable_jpeg(bytes: &[u8]) -> RgbImage {
    assert!(!bytes.is_empty(), "payload is empty");
    assert_eq!(&bytes[..2], &[0xFF, 0xD8], "payload lacks the JPEG SOI marker");
    let format = image::guess_format(bytes).expect("payload format not recognised");
    assert_eq!(format, image::ImageFormat::Jpeg, "payload is {format:?}, not JPEG");
    image::load_from_memory(bytes)
        .expect("payload does not decode as an image")
        .to_rgb8()
}

/// Assert that a pixel is within `tolerance` of `expected` on every channel.
pub fn assert_pixel_approx(image: &RgbImage, x: u32, y: u32, expected: [u8; 3], tolerance: u8) {
    let actual = image.get_pixel(x, y).0;
    for (channel, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            a.abs_diff(e) <= tolerance,
            "pixel ({x},{y}) is {actual:?}, expected ~{expected:?} (channel {channel} off by {})",
            a.abs_diff(e)
        );
    }
}
