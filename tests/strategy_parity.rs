use std::sync::Arc;

use convbench::{BufferPool, LAPLACE_5X5, PixelLayout, Raster, StrategyKind, create_strategy};

fn pattern_rgb(w: u32, h: u32) -> Vec<u8> {
    (0..w * h * 3)
        .map(|i| (i.wrapping_mul(2_654_435_761) >> 7) as u8)
        .collect()
}

fn reference(src: &Raster) -> Raster {
    let mut out = src.clone();
    let (w, h) = (src.width() as usize, src.height() as usize);
    for y in 2..h - 2 {
        for x in 2..w - 2 {
            let mut acc = [0i32; 3];
            for (ky, row) in LAPLACE_5X5.iter().enumerate() {
                for (kx, &k) in row.iter().enumerate() {
                    let px = src.rgb(x + kx - 2, y + ky - 2);
                    for c in 0..3 {
                        acc[c] += k * i32::from(px[c]);
                    }
                }
            }
            out.set_rgb(x, y, acc.map(|v| v.clamp(0, 255) as u8));
        }
    }
    out
}

fn all_strategies() -> Vec<Box<dyn convbench::BufferStrategy>> {
    let pool = Arc::new(BufferPool::default());
    StrategyKind::ALL
        .iter()
        .map(|&k| create_strategy(k, Some(Arc::clone(&pool))).unwrap())
        .collect()
}

#[test]
fn every_strategy_matches_the_reference() {
    let src = Raster::from_rgb8(23, 17, &pattern_rgb(23, 17)).unwrap();
    let expected = reference(&src);
    for s in all_strategies() {
        let out = s.filter(&src).unwrap();
        assert_eq!(out, expected, "strategy {}", s.name());
    }
}

#[test]
fn alpha_images_keep_alpha_and_agree() {
    let (w, h) = (9u32, 12u32);
    let rgba: Vec<u8> = pattern_rgb(w, h)
        .chunks_exact(3)
        .enumerate()
        .flat_map(|(i, px)| [px[0], px[1], px[2], (i * 5) as u8])
        .collect();
    let src = Raster::from_rgba8(w, h, &rgba).unwrap();
    assert_eq!(src.layout(), PixelLayout::Argb32);

    let expected = reference(&src);
    for s in all_strategies() {
        let out = s.filter(&src).unwrap();
        assert_eq!(out.layout(), PixelLayout::Argb32);
        for y in 0..h as usize {
            for x in 0..w as usize {
                assert_eq!(out.alpha(x, y), src.alpha(x, y), "{} at ({x},{y})", s.name());
            }
        }
        assert_eq!(out, expected, "strategy {}", s.name());
    }
}

#[test]
fn output_extent_matches_input() {
    for (w, h) in [(5u32, 5u32), (5, 40), (31, 6), (64, 64)] {
        let src = Raster::from_rgb8(w, h, &pattern_rgb(w, h)).unwrap();
        for s in all_strategies() {
            let out = s.filter(&src).unwrap();
            assert_eq!((out.width(), out.height()), (w, h), "{} {w}x{h}", s.name());
        }
    }
}

#[test]
fn concurrent_use_of_one_strategy_is_deterministic() {
    let src = Raster::from_rgb8(40, 30, &pattern_rgb(40, 30)).unwrap();
    let expected = reference(&src);
    for s in all_strategies() {
        let s: Arc<dyn convbench::BufferStrategy> = Arc::from(s);
        // Native locking is exclusive per raster, so each worker filters its own copy.
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let s = Arc::clone(&s);
                let src = src.clone();
                std::thread::spawn(move || s.filter(&src).unwrap())
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), expected, "strategy {}", s.name());
        }
    }
}

#[test]
fn locked_source_is_refused_only_by_native_strategy() {
    let src = Raster::from_rgb8(8, 8, &pattern_rgb(8, 8)).unwrap();
    let _held = src.lock_read().unwrap();
    for s in all_strategies() {
        let res = s.filter(&src);
        if s.kind() == StrategyKind::NativeLocked {
            assert!(matches!(res, Err(convbench::ConvError::AlreadyLocked(_))));
        } else {
            assert!(res.is_ok(), "{}", s.name());
        }
    }
}
