/// The eight 2-D neighbours used as the base lattice for
/// `max_step_connection = 1`.
pub const BASE_DIRECTIONS: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Direction lattice for a given `max_step_connection`. For `m = 1` this is
/// exactly `BASE_DIRECTIONS`. For `m > 1`, every knight-style offset
/// `(j, k)` with `j, k` in `[-m, m] \ {0}` and `|j| != |k|` is added, which
/// by construction never duplicates a base neighbour (those all have
/// `|j| == |k| == 1` or one coordinate zero).
pub fn generate_directions(max_step_connection: i32) -> Vec<(i32, i32)> {
    let mut dirs: Vec<(i32, i32)> = BASE_DIRECTIONS.to_vec();
    let m = max_step_connection;
    if m > 1 {
        for j in -m..=m {
            if j == 0 {
                continue;
            }
            for k in -m..=m {
                if k == 0 || j.abs() == k.abs() {
                    continue;
                }
                dirs.push((j, k));
            }
        }
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn fan_out_one_is_exactly_the_base_eight() {
        let dirs = generate_directions(1);
        assert_eq!(dirs.len(), 8);
        let set: HashSet<_> = dirs.into_iter().collect();
        let base: HashSet<_> = BASE_DIRECTIONS.into_iter().collect();
        assert_eq!(set, base);
    }

    #[test]
    fn higher_fan_out_adds_knight_offsets_without_duplicates() {
        let dirs = generate_directions(2);
        let set: HashSet<(i32, i32)> = dirs.iter().copied().collect();
        assert_eq!(set.len(), dirs.len(), "no duplicate directions");
        assert!(set.contains(&(1, 2)));
        assert!(set.contains(&(2, 1)));
        assert!(!set.contains(&(2, 2)));
    }
}
