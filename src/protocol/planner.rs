use super::{addr::DataTableAddress, types};

/// Maximum data payload of a single PCCC typed read.
///
/// SLC 5/03 tops out near 164 bytes; SLC 5/04, 5/05 and MicroLogix accept
/// ~236. 236 is the conservative cap that works on 5/04+ hardware.
pub const MAX_TYPED_READ_BYTES: usize = 236;

/// One planned multi-element read: `count` contiguous elements of one data
/// file starting at `start_element`, serving the original request positions
/// in `indices` (element `start_element + j` answers `indices[j]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkRead {
    pub file_number: u16,
    pub file_type: u8,
    pub start_element: u16,
    pub indices: Vec<usize>,
}

impl BulkRead {
    pub fn count(&self) -> usize {
        self.indices.len()
    }

    pub fn element_size(&self) -> usize {
        types::element_size(self.file_type)
    }

    pub fn byte_count(&self) -> usize {
        self.count() * self.element_size()
    }
}

/// Plan bulk reads over a parsed request list.
///
/// `parsed[i]` is `None` when request `i` failed to parse or is otherwise
/// excluded. Only whole-element requests (no sub-element, no bit) are
/// bulkable; they are grouped by `(file_number, file_type)`, sorted by
/// element, split into maximal contiguous runs, and chunked so that no
/// request exceeds `MAX_TYPED_READ_BYTES`. Runs and chunks shorter than two
/// elements stay on the single-read path.
///
/// Requests not covered by the returned plan (and bulk reads that later fail
/// on the wire) are read individually by the caller; that fallback keeps
/// per-request error isolation.
pub fn plan_bulk_reads(parsed: &[Option<&DataTableAddress>]) -> Vec<BulkRead> {
    // Group bulkable request indices by (file_number, file_type)
    let mut groups: Vec<((u16, u8), Vec<usize>)> = Vec::new();
    for (i, addr) in parsed.iter().enumerate() {
        let Some(addr) = addr else { continue };
        if !addr.is_bulkable() {
            continue;
        }
        let key = (addr.file_number, addr.file_type);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, indices)) => indices.push(i),
            None => groups.push((key, vec![i])),
        }
    }

    let mut plan = Vec::new();
    for ((file_number, file_type), mut indices) in groups {
        if indices.len() < 2 {
            continue;
        }

        indices.sort_by_key(|&i| element_of(parsed, i));

        let elem_size = types::element_size(file_type);
        let max_count = (MAX_TYPED_READ_BYTES / elem_size).max(1);

        for run in contiguous_runs(&indices, |i| element_of(parsed, i)) {
            if run.len() < 2 {
                continue;
            }
            for chunk in run.chunks(max_count) {
                if chunk.len() < 2 {
                    continue;
                }
                plan.push(BulkRead {
                    file_number,
                    file_type,
                    start_element: element_of(parsed, chunk[0]),
                    indices: chunk.to_vec(),
                });
            }
        }
    }
    plan
}

#[inline]
fn element_of(parsed: &[Option<&DataTableAddress>], i: usize) -> u16 {
    // Only called for indices collected from Some entries
    parsed[i].map(|a| a.element).unwrap_or(0)
}

/// Split a sorted index slice into maximal runs of consecutive element
/// numbers (each next element exactly one above the previous).
pub fn contiguous_runs<F>(sorted_indices: &[usize], elem_of: F) -> Vec<Vec<usize>>
where
    F: Fn(usize) -> u16,
{
    let mut runs: Vec<Vec<usize>> = Vec::new();
    let Some(&first) = sorted_indices.first() else {
        return runs;
    };

    let mut current = vec![first];
    for &idx in &sorted_indices[1..] {
        let prev = elem_of(*current.last().expect("run is never empty"));
        if elem_of(idx) == prev.wrapping_add(1) && prev != u16::MAX {
            current.push(idx);
        } else {
            runs.push(std::mem::take(&mut current));
            current.push(idx);
        }
    }
    runs.push(current);
    runs
}

#[cfg(test)]
mod tests {
    use super::super::addr::parse_data_table_address;
    use super::*;

    fn parse_all(addrs: &[&str]) -> Vec<DataTableAddress> {
        addrs.iter().map(|a| parse_data_table_address(a).unwrap()).collect()
    }

    fn refs(parsed: &[DataTableAddress]) -> Vec<Option<&DataTableAddress>> {
        parsed.iter().map(Some).collect()
    }

    #[test]
    fn mixed_request_list_plans_one_bulk() {
        let parsed = parse_all(&["N7:0", "N7:1", "N7:2", "F8:0", "B3:0/5", "T4:0.ACC"]);
        let plan = plan_bulk_reads(&refs(&parsed));

        assert_eq!(plan.len(), 1);
        let bulk = &plan[0];
        assert_eq!(bulk.file_number, 7);
        assert_eq!(bulk.file_type, types::file_type::INTEGER);
        assert_eq!(bulk.start_element, 0);
        assert_eq!(bulk.indices, vec![0, 1, 2]);
        assert_eq!(bulk.byte_count(), 6);
    }

    #[test]
    fn out_of_order_input_sorted_into_one_run() {
        let parsed = parse_all(&["N7:2", "N7:0", "N7:1"]);
        let plan = plan_bulk_reads(&refs(&parsed));
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].start_element, 0);
        assert_eq!(plan[0].indices, vec![1, 2, 0]);
    }

    #[test]
    fn gaps_split_runs() {
        let parsed = parse_all(&["N7:0", "N7:1", "N7:5", "N7:6", "N7:9"]);
        let plan = plan_bulk_reads(&refs(&parsed));
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].indices, vec![0, 1]);
        assert_eq!(plan[1].indices, vec![2, 3]);
        // N7:9 is a singleton run and stays on the single-read path
    }

    #[test]
    fn singletons_and_non_bulkable_excluded() {
        let parsed = parse_all(&["N7:0", "F8:0", "B3:0/5", "T4:0.ACC"]);
        assert!(plan_bulk_reads(&refs(&parsed)).is_empty());
    }

    #[test]
    fn chunking_respects_payload_cap() {
        // 150 contiguous N-file words = 300 bytes > 236, so two chunks:
        // 118 elements then 32
        let addrs: Vec<String> = (0..150).map(|i| format!("N7:{i}")).collect();
        let addr_refs: Vec<&str> = addrs.iter().map(String::as_str).collect();
        let parsed = parse_all(&addr_refs);
        let plan = plan_bulk_reads(&refs(&parsed));

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].count(), 118);
        assert_eq!(plan[1].count(), 32);
        for bulk in &plan {
            assert!(bulk.byte_count() <= MAX_TYPED_READ_BYTES);
        }
        assert_eq!(plan[0].start_element, 0);
        assert_eq!(plan[1].start_element, 118);
    }

    #[test]
    fn trailing_singleton_chunk_degrades_to_single_read() {
        // 119 elements: chunk of 118 + a 1-element remainder that must not
        // become a bulk read
        let addrs: Vec<String> = (0..119).map(|i| format!("N7:{i}")).collect();
        let addr_refs: Vec<&str> = addrs.iter().map(String::as_str).collect();
        let parsed = parse_all(&addr_refs);
        let plan = plan_bulk_reads(&refs(&parsed));

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].count(), 118);
    }

    #[test]
    fn wide_elements_chunk_by_element_size() {
        // Timers are 6 bytes: 236 / 6 = 39 elements per chunk
        let addrs: Vec<String> = (0..80).map(|i| format!("T4:{i}")).collect();
        let addr_refs: Vec<&str> = addrs.iter().map(String::as_str).collect();
        let parsed = parse_all(&addr_refs);
        let plan = plan_bulk_reads(&refs(&parsed));

        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].count(), 39);
        assert_eq!(plan[1].count(), 39);
        assert_eq!(plan[2].count(), 2);
        for bulk in &plan {
            assert!(bulk.byte_count() <= MAX_TYPED_READ_BYTES);
        }
    }

    #[test]
    fn duplicate_elements_break_runs() {
        let parsed = parse_all(&["N7:0", "N7:0", "N7:1"]);
        let plan = plan_bulk_reads(&refs(&parsed));
        // First N7:0 starts a run, the duplicate breaks it; only the
        // second run (N7:0, N7:1) has length 2
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].indices.len(), 2);
    }

    #[test]
    fn parse_failures_are_skipped() {
        let parsed = parse_all(&["N7:0", "N7:1"]);
        let with_hole = vec![Some(&parsed[0]), None, Some(&parsed[1])];
        let plan = plan_bulk_reads(&with_hole);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].indices, vec![0, 2]);
    }

    #[test]
    fn contiguous_runs_are_maximal() {
        let elems = [1u16, 2, 3, 7, 8, 20];
        let indices: Vec<usize> = (0..elems.len()).collect();
        let runs = contiguous_runs(&indices, |i| elems[i]);
        assert_eq!(runs, vec![vec![0, 1, 2], vec![3, 4], vec![5]]);
    }

    #[test]
    fn contiguous_runs_empty_input() {
        let runs = contiguous_runs(&[], |_| 0);
        assert!(runs.is_empty());
    }
}
