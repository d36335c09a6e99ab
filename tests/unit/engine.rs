use super::*;

fn packed(w: u32, h: u32, px: impl Fn(usize, usize) -> [u8; 3]) -> Vec<u8> {
    let mut out = Vec::with_capacity((w * h * 3) as usize);
    for y in 0..h as usize {
        for x in 0..w as usize {
            out.extend_from_slice(&px(x, y));
        }
    }
    out
}

fn run(src: &[u8], w: u32, h: u32) -> Vec<u8> {
    let g = PlaneGeometry::packed_rgb(w, h).unwrap();
    let mut dst = vec![0u8; src.len()];
    convolve(src, &g, dst.as_mut_slice(), &g, Kernel::laplace(), &CancelToken::new()).unwrap();
    dst
}

#[test]
fn all_zero_image_stays_zero() {
    let src = vec![0u8; 10 * 10 * 3];
    assert!(run(&src, 10, 10).iter().all(|&v| v == 0));
}

#[test]
fn single_bright_pixel_saturates_centre_and_clamps_neighbours() {
    let src = packed(10, 10, |x, y| if (x, y) == (5, 5) { [255; 3] } else { [0; 3] });
    let out = run(&src, 10, 10);
    let at = |x: usize, y: usize| &out[(y * 10 + x) * 3..(y * 10 + x) * 3 + 3];

    assert_eq!(at(5, 5), &[255, 255, 255]);
    for (dx, dy) in [
        (0i32, -2i32),
        (-1, -1),
        (0, -1),
        (1, -1),
        (-2, 0),
        (-1, 0),
        (1, 0),
        (2, 0),
        (-1, 1),
        (0, 1),
        (1, 1),
        (0, 2),
    ] {
        let (x, y) = ((5 + dx) as usize, (5 + dy) as usize);
        assert_eq!(at(x, y), &[0, 0, 0], "tap ({dx},{dy})");
    }
}

#[test]
fn channels_are_independent() {
    // Only the red channel of the centre pixel is lit.
    let src = packed(7, 7, |x, y| if (x, y) == (3, 3) { [10, 0, 0] } else { [0; 3] });
    let out = run(&src, 7, 7);
    let c = (3 * 7 + 3) * 3;
    assert_eq!(&out[c..c + 3], &[160, 0, 0]);
}

#[test]
fn border_pixels_are_not_written() {
    let src = packed(6, 6, |_, _| [0; 3]);
    let g = PlaneGeometry::packed_rgb(6, 6).unwrap();
    let mut dst = vec![42u8; src.len()];
    convolve(
        src.as_slice(),
        &g,
        dst.as_mut_slice(),
        &g,
        Kernel::laplace(),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(&dst[0..3], &[42, 42, 42]);
    let interior = (2 * 6 + 2) * 3;
    assert_eq!(&dst[interior..interior + 3], &[0, 0, 0]);
    let edge = (5 * 6 + 5) * 3;
    assert_eq!(&dst[edge..edge + 3], &[42, 42, 42]);
}

#[test]
fn storage_order_does_not_change_result() {
    let (w, h) = (9u32, 7u32);
    let rgb = packed(w, h, |x, y| {
        [
            (x * 31 + y * 7) as u8,
            (x * x + y * 13) as u8,
            (255 - x * 20 - y) as u8,
        ]
    });
    let expected = run(&rgb, w, h);

    // Same pixels stored as padded BGRA rows.
    let stride = 40;
    let bgra_geom = PlaneGeometry {
        width: w as usize,
        height: h as usize,
        stride,
        pixel_bytes: 4,
        rgb: [2, 1, 0],
        alpha: Some(3),
    };
    let mut bgra = vec![0u8; stride * h as usize];
    for y in 0..h as usize {
        for x in 0..w as usize {
            let s = (y * w as usize + x) * 3;
            let d = bgra_geom.offset(x, y);
            bgra[d] = rgb[s + 2];
            bgra[d + 1] = rgb[s + 1];
            bgra[d + 2] = rgb[s];
            bgra[d + 3] = 255;
        }
    }
    let mut out = vec![0u8; bgra.len()];
    convolve(
        bgra.as_slice(),
        &bgra_geom,
        out.as_mut_slice(),
        &bgra_geom,
        Kernel::laplace(),
        &CancelToken::new(),
    )
    .unwrap();

    for y in 2..h as usize - 2 {
        for x in 2..w as usize - 2 {
            let e = (y * w as usize + x) * 3;
            let d = bgra_geom.offset(x, y);
            assert_eq!([out[d + 2], out[d + 1], out[d]], [expected[e], expected[e + 1], expected[e + 2]]);
        }
    }
}

#[test]
fn too_small_is_out_of_range() {
    for (w, h) in [(4u32, 10u32), (10, 4), (1, 1)] {
        let g = PlaneGeometry::packed_rgb(w, h).unwrap();
        let src = vec![0u8; (w * h * 3) as usize];
        let mut dst = src.clone();
        let err = convolve(
            src.as_slice(),
            &g,
            dst.as_mut_slice(),
            &g,
            Kernel::laplace(),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ConvError::OutOfRange(_)), "{w}x{h}: {err}");
    }
}

#[test]
fn undersized_buffers_are_rejected() {
    let g = PlaneGeometry::packed_rgb(8, 8).unwrap();
    let src = vec![0u8; 8 * 8 * 3 - 1];
    let mut dst = vec![0u8; 8 * 8 * 3];
    let err = convolve(
        src.as_slice(),
        &g,
        dst.as_mut_slice(),
        &g,
        Kernel::laplace(),
        &CancelToken::new(),
    )
    .unwrap_err();
    assert!(matches!(err, ConvError::InvalidSize(_)));
}

#[test]
fn cancelled_pass_stops_early() {
    let g = PlaneGeometry::packed_rgb(8, 8).unwrap();
    let src = vec![0u8; 8 * 8 * 3];
    let mut dst = vec![7u8; 8 * 8 * 3];
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = convolve(
        src.as_slice(),
        &g,
        dst.as_mut_slice(),
        &g,
        Kernel::laplace(),
        &cancel,
    )
    .unwrap_err();
    assert!(matches!(err, ConvError::Cancelled));
    assert!(dst.iter().all(|&v| v == 7));
}

#[test]
fn extreme_weights_saturate_instead_of_overflowing() {
    let g = PlaneGeometry::packed_rgb(6, 6).unwrap();
    let src = vec![255u8; 6 * 6 * 3];
    let cancel = CancelToken::new();

    let mut dst = vec![0u8; src.len()];
    let huge = Kernel::from_weights([[i32::MAX; 5]; 5]);
    convolve(src.as_slice(), &g, dst.as_mut_slice(), &g, &huge, &cancel).unwrap();
    assert_eq!(&dst[(2 * 6 + 2) * 3..(2 * 6 + 2) * 3 + 3], &[255, 255, 255]);

    let mut dst = vec![9u8; src.len()];
    let tiny = Kernel::from_weights([[i32::MIN; 5]; 5]);
    convolve(src.as_slice(), &g, dst.as_mut_slice(), &g, &tiny, &cancel).unwrap();
    assert_eq!(&dst[(3 * 6 + 3) * 3..(3 * 6 + 3) * 3 + 3], &[0, 0, 0]);
}
