/// One step of a reconstructed path: the node and the cost to reach the
/// *next* member. The last member's cost is always 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathMember {
    pub node_id: i32,
    pub cost_to_next: f32,
}

/// Ordered sequence of path members. An empty path represents an
/// unreachable pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path(pub Vec<PathMember>);

impl Path {
    pub fn new(members: Vec<PathMember>) -> Self {
        Path(members)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn members(&self) -> &[PathMember] {
        &self.0
    }

    pub fn cost_sum(&self) -> f32 {
        self.0.iter().map(|m| m.cost_to_next).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_sum_adds_all_segments() {
        let path = Path::new(vec![
            PathMember {
                node_id: 0,
                cost_to_next: 2.0,
            },
            PathMember {
                node_id: 2,
                cost_to_next: 1.0,
            },
            PathMember {
                node_id: 4,
                cost_to_next: 0.0,
            },
        ]);
        assert_eq!(path.cost_sum(), 3.0);
        assert_eq!(path.len(), 3);
    }
}
