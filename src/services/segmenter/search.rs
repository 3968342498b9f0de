// src/services/segmenter/search.rs

//! Margin searches over crop heights.
//!
//! The searches only see a predicate `(margin) -> bool`; cropping and text
//! extraction happen behind it.

use std::future::Future;

use super::markers::HEAD_LINES;
use crate::error::Result;

/// Largest `k` in `[lo, hi]` for which `holds(k)` is true.
///
/// `holds` must be monotone over the interval (true up to some point, false
/// after it). `lo` is returned when no larger value passes.
pub async fn bisect<F, Fut>(mut lo: u32, mut hi: u32, mut holds: F) -> Result<u32>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    while lo < hi {
        let mid = lo + (hi - lo).div_ceil(2);
        if holds(mid).await? {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    Ok(lo)
}

/// Height of the running page header, in points.
///
/// `name_visible(k, lines)` crops `k` points off the top of a sample page and
/// tells whether a problem name is still announced within its first `lines`
/// lines. The first search finds the last margin that keeps the name on the
/// page head; the second finds, below it, the last margin that has not yet
/// brought the name up to the very first line. Everything above the name is
/// header. A failing crop degrades to no header crop.
pub async fn header_offset<F, Fut>(max_offset: u32, padding: u32, mut name_visible: F) -> u32
where
    F: FnMut(u32, usize) -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    match search_header(max_offset, &mut name_visible).await {
        Ok(offset) => offset + padding,
        Err(e) => {
            log::warn!("Header detection failed, not cropping headers: {}", e);
            0
        }
    }
}

async fn search_header<F, Fut>(max_offset: u32, name_visible: &mut F) -> Result<u32>
where
    F: FnMut(u32, usize) -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let keeps_name = bisect(0, max_offset, |k| name_visible(k, HEAD_LINES)).await?;
    bisect(0, keeps_name, |k| {
        let on_first_line = name_visible(k, 1);
        async move { on_first_line.await.map(|visible| !visible) }
    })
    .await
}
