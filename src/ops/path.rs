use std::sync::LazyLock;

use regex::Regex;

use crate::model::coordinate::Coordinate;
use crate::model::hierarchy::Hierarchy;

/// Error type for path addressing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("unknown level: {0}")]
    UnknownLevel(String),
    #[error("incomplete coordinate for level {level}: need {needed} indices, got {got}")]
    IncompleteCoordinate {
        level: String,
        needed: usize,
        got: usize,
    },
    #[error("level {level} has no field named {field}")]
    UnknownField { level: String, field: String },
    #[error("level {0} has no child collection")]
    NoChildLevel(String),
    #[error("malformed field path: {0}")]
    MalformedPath(String),
}

/// A flat path resolved back into tree terms
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAddress {
    pub level: String,
    pub rank: usize,
    pub coordinate: Coordinate,
    pub field: String,
}

static SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\[(\d+)\]$").unwrap_or_else(|e| panic!("{e}"))
});

/// The flat path of `field` on the `level` node at `coordinate`.
///
/// Indices in `coordinate` beyond the level's rank are ignored. Paths are
/// never cached: a sibling insert, delete or move shifts them.
pub fn field_path(
    hierarchy: &Hierarchy,
    level: &str,
    coordinate: &Coordinate,
    field: &str,
) -> Result<String, PathError> {
    let rank = hierarchy
        .rank(level)
        .ok_or_else(|| PathError::UnknownLevel(level.to_string()))?;
    if coordinate.len() < rank + 1 {
        return Err(PathError::IncompleteCoordinate {
            level: level.to_string(),
            needed: rank + 1,
            got: coordinate.len(),
        });
    }
    let schema = &hierarchy.levels()[rank];
    if !schema.has_field(field) {
        return Err(PathError::UnknownField {
            level: level.to_string(),
            field: field.to_string(),
        });
    }
    let mut path = node_prefix(hierarchy, &coordinate.truncated(rank + 1));
    path.push_str(field);
    Ok(path)
}

/// The flat path of the child collection under `parent`, e.g.
/// `milestones[1].tasks`, or `milestones` for the root coordinate
pub fn collection_path(hierarchy: &Hierarchy, parent: &Coordinate) -> Result<String, PathError> {
    let child = hierarchy.level(parent.len()).ok_or_else(|| {
        let deepest = &hierarchy.levels()[hierarchy.depth() - 1];
        PathError::NoChildLevel(deepest.name.clone())
    })?;
    let mut path = node_prefix(hierarchy, parent);
    path.push_str(&child.name);
    Ok(path)
}

/// `"<level0>[i0].<level1>[i1]."` for every index in `coordinate`
fn node_prefix(hierarchy: &Hierarchy, coordinate: &Coordinate) -> String {
    let mut out = String::new();
    for (level, idx) in hierarchy.levels().iter().zip(coordinate.indices()) {
        out.push_str(&level.name);
        out.push('[');
        out.push_str(&idx.to_string());
        out.push_str("].");
    }
    out
}

/// Resolve a flat path produced by [`field_path`] back into its level,
/// coordinate and field.
pub fn parse_field_path(hierarchy: &Hierarchy, path: &str) -> Result<FieldAddress, PathError> {
    let (coordinate, field) = split_node_path(hierarchy, path)?;
    let rank = coordinate.len() - 1;
    let schema = &hierarchy.levels()[rank];
    if !schema.has_field(field) {
        return Err(PathError::UnknownField {
            level: schema.name.clone(),
            field: field.to_string(),
        });
    }
    Ok(FieldAddress {
        level: schema.name.clone(),
        rank,
        coordinate,
        field: field.to_string(),
    })
}

/// Resolve `<node>.<child level>`, e.g. `tasks[0].steps`, into the parent
/// coordinate and the collection name. Servers attach collection-wide
/// messages ("at least one step is required") to such paths.
pub fn parse_collection_path(hierarchy: &Hierarchy, path: &str) -> Result<(Coordinate, String), PathError> {
    let (parent, name) = split_node_path(hierarchy, path)?;
    let rank = parent.len() - 1;
    match hierarchy.child_level(rank) {
        Some(child) if child.name == name => Ok((parent, name.to_string())),
        Some(_) => Err(PathError::UnknownField {
            level: hierarchy.levels()[rank].name.clone(),
            field: name.to_string(),
        }),
        None => Err(PathError::NoChildLevel(hierarchy.levels()[rank].name.clone())),
    }
}

/// Split `<level0>[i0]....<levelN>[iN].<tail>` into the node coordinate and
/// the trailing segment, checking the levels follow the hierarchy from rank 0
fn split_node_path<'p>(hierarchy: &Hierarchy, path: &'p str) -> Result<(Coordinate, &'p str), PathError> {
    let malformed = || PathError::MalformedPath(path.to_string());
    let segments: Vec<&str> = path.split('.').collect();
    let (tail, nodes) = segments.split_last().ok_or_else(malformed)?;
    if nodes.is_empty() || tail.is_empty() || tail.contains('[') {
        return Err(malformed());
    }

    let mut indices = Vec::with_capacity(nodes.len());
    for (rank, segment) in nodes.iter().enumerate() {
        let caps = SEGMENT.captures(segment).ok_or_else(malformed)?;
        let name = &caps[1];
        let expected = hierarchy
            .level(rank)
            .ok_or_else(|| PathError::UnknownLevel(name.to_string()))?;
        if expected.name != name {
            return Err(PathError::UnknownLevel(name.to_string()));
        }
        let idx = caps[2].parse::<usize>().map_err(|_| malformed())?;
        indices.push(idx);
    }
    Ok((Coordinate::new(indices), tail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_path_step() {
        let h = Hierarchy::project();
        let path = field_path(&h, "steps", &Coordinate::from([2, 0, 1]), "assignee_id").unwrap();
        assert_eq!(path, "milestones[2].tasks[0].steps[1].assignee_id");
    }

    #[test]
    fn test_field_path_root_level() {
        let h = Hierarchy::project();
        let path = field_path(&h, "milestones", &Coordinate::from([3]), "title").unwrap();
        assert_eq!(path, "milestones[3].title");
    }

    #[test]
    fn test_field_path_ignores_deeper_indices() {
        let h = Hierarchy::project();
        let path = field_path(&h, "tasks", &Coordinate::from([1, 2, 9, 9]), "title").unwrap();
        assert_eq!(path, "milestones[1].tasks[2].title");
    }

    #[test]
    fn test_field_path_is_deterministic() {
        let h = Hierarchy::standard(&["milestones", "tasks"]).unwrap();
        let coord = Coordinate::from([1, 2]);
        let first = field_path(&h, "tasks", &coord, "title").unwrap();
        for _ in 0..10 {
            assert_eq!(field_path(&h, "tasks", &coord, "title").unwrap(), first);
        }
        assert_eq!(first, "milestones[1].tasks[2].title");
    }

    #[test]
    fn test_field_path_unknown_level() {
        let h = Hierarchy::tasks();
        let err = field_path(&h, "milestones", &Coordinate::from([0]), "title").unwrap_err();
        assert_eq!(err, PathError::UnknownLevel("milestones".into()));
    }

    #[test]
    fn test_field_path_incomplete_coordinate() {
        let h = Hierarchy::project();
        let err = field_path(&h, "steps", &Coordinate::from([2, 0]), "title").unwrap_err();
        assert_eq!(
            err,
            PathError::IncompleteCoordinate {
                level: "steps".into(),
                needed: 3,
                got: 2,
            }
        );
    }

    #[test]
    fn test_field_path_unknown_field() {
        let h = Hierarchy::project();
        let err = field_path(&h, "checklists", &Coordinate::from([0, 0, 0, 0]), "status_id")
            .unwrap_err();
        assert!(matches!(err, PathError::UnknownField { .. }));
    }

    #[test]
    fn test_collection_path() {
        let h = Hierarchy::project();
        assert_eq!(collection_path(&h, &Coordinate::root()).unwrap(), "milestones");
        assert_eq!(
            collection_path(&h, &Coordinate::from([1, 0])).unwrap(),
            "milestones[1].tasks[0].steps"
        );
        let err = collection_path(&h, &Coordinate::from([0, 0, 0, 0])).unwrap_err();
        assert_eq!(err, PathError::NoChildLevel("checklists".into()));
    }

    #[test]
    fn test_parse_field_path_inverts_field_path() {
        let h = Hierarchy::project();
        let coord = Coordinate::from([2, 0, 1]);
        let path = field_path(&h, "steps", &coord, "due_date").unwrap();
        let addr = parse_field_path(&h, &path).unwrap();
        assert_eq!(addr.level, "steps");
        assert_eq!(addr.rank, 2);
        assert_eq!(addr.coordinate, coord);
        assert_eq!(addr.field, "due_date");
    }

    #[test]
    fn test_parse_field_path_rejects_out_of_order_levels() {
        let h = Hierarchy::project();
        let err = parse_field_path(&h, "tasks[0].title").unwrap_err();
        assert_eq!(err, PathError::UnknownLevel("tasks".into()));
    }

    #[test]
    fn test_parse_field_path_malformed() {
        let h = Hierarchy::project();
        for bad in ["title", "milestones[x].title", "milestones[0]", "milestones[0].", ""] {
            assert!(
                matches!(parse_field_path(&h, bad), Err(PathError::MalformedPath(_))),
                "expected malformed: {bad:?}"
            );
        }
    }

    #[test]
    fn test_parse_collection_path() {
        let h = Hierarchy::tasks();
        let (parent, name) = parse_collection_path(&h, "tasks[3].steps").unwrap();
        assert_eq!(parent, Coordinate::from([3]));
        assert_eq!(name, "steps");
        assert!(matches!(
            parse_collection_path(&h, "tasks[3].title"),
            Err(PathError::UnknownField { .. })
        ));
        assert_eq!(
            parse_collection_path(&h, "tasks[0].steps[1].checklists[0].items").unwrap_err(),
            PathError::NoChildLevel("checklists".into())
        );
    }
}
