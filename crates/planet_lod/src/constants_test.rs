use super::*;

#[test]
fn test_half_vertex_count() {
  assert_eq!(HALF_LATTICE_VERTICES, 45);
  assert_eq!(LATTICE_VERTICES, 90);
  assert_eq!(row_offset(LATTICE_RESOLUTION + 1), HALF_LATTICE_VERTICES);
}

#[test]
fn test_lattice_index_roundtrip() {
  let mut expected = 0;
  for half in 0..2 {
    for i in 0..=LATTICE_RESOLUTION {
      for j in 0..=(LATTICE_RESOLUTION - i) {
        let idx = lattice_index(half, i, j);
        assert_eq!(idx, expected, "Indices must be dense and ordered");
        assert_eq!(
          lattice_coord(idx),
          (half, i, j),
          "Roundtrip failed for ({}, {}, {})",
          half,
          i,
          j
        );
        expected += 1;
      }
    }
  }
  assert_eq!(expected, LATTICE_VERTICES);
}

#[test]
fn test_batch_capacity_fits_storage_page() {
  assert!(BATCH_CAPACITY <= STORAGE_PAGE_SLICES);
}
