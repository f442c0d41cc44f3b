//! Coalescing of small reads into page-bounded spans.

use crate::process::{Address, ReadSpan};

/// Where one requested piece lives inside the spans of a [`ReadPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Placement {
    pub span: usize,
    pub offset: usize,
    pub len: usize,
}

#[derive(Debug, Default)]
pub(crate) struct ReadPlan {
    pub spans: Vec<ReadSpan>,
    pub placements: Vec<Placement>,
}

fn page_of(address: Address, page_size: u64) -> u64 {
    address / page_size
}

/// Merge pieces that fall inside the same page into one span.
///
/// A merged span never leaves its page, so it is readable exactly when every
/// piece in it is. Pieces that straddle a page boundary are read on their own.
pub(crate) fn plan(pieces: &[ReadSpan], page_size: u64) -> ReadPlan {
    let page_size = page_size.max(1);
    let mut order: Vec<usize> = (0..pieces.len()).collect();
    order.sort_by_key(|&i| (pieces[i].address, pieces[i].len));

    let mut spans: Vec<ReadSpan> = Vec::new();
    let mut placements = vec![
        Placement {
            span: 0,
            offset: 0,
            len: 0
        };
        pieces.len()
    ];
    // Span currently accepting pieces, with its page
    let mut open: Option<(usize, u64)> = None;

    for i in order {
        let piece = pieces[i];
        let first = page_of(piece.address, page_size);
        let last = page_of(piece.end().saturating_sub(1).max(piece.address), page_size);

        if first != last {
            spans.push(piece);
            placements[i] = Placement {
                span: spans.len() - 1,
                offset: 0,
                len: piece.len,
            };
            continue;
        }

        let span_idx = match open {
            Some((idx, page)) if page == first => {
                let span = &mut spans[idx];
                let end = span.end().max(piece.end());
                span.len = (end - span.address) as usize;
                idx
            }
            _ => {
                spans.push(piece);
                let idx = spans.len() - 1;
                open = Some((idx, first));
                idx
            }
        };

        placements[i] = Placement {
            span: span_idx,
            offset: (piece.address - spans[span_idx].address) as usize,
            len: piece.len,
        };
    }

    ReadPlan { spans, placements }
}
