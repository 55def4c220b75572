use crate::model::*;

// ── Availability Algorithm ────────────────────────────────────────

/// Free time inside `working` once `occupied` is taken out.
///
/// Both inputs must be sorted by start; `working` must also be disjoint.
pub fn free_spans(working: &[Span], occupied: &[Span]) -> Vec<Span> {
    if occupied.is_empty() {
        return working.to_vec();
    }
    subtract_intervals(working, &merge_overlapping(occupied))
}

/// Cut every free span into back-to-back slots of `slot` ms starting at the span's own
/// start. A trailing piece shorter than `slot` is dropped. Stops after `limit` slots.
pub fn chop_slots(free: &[Span], slot: Ms, limit: usize) -> Vec<Span> {
    debug_assert!(slot > 0);
    let mut slots = Vec::new();
    for span in free {
        let mut start = span.start;
        while let Some(end) = start.checked_add(slot)
            && end <= span.end
        {
            if slots.len() == limit {
                return slots;
            }
            slots.push(Span::new(start, end));
            start = end;
        }
    }
    slots
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

/// `base` minus `to_remove`; both sorted by start, `to_remove` disjoint.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}
