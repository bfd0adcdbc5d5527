//! Permission resolution.
//!
//! Leaf assets (datasets, algos, objectives) get the permissions requested by
//! their creator, with the creating node always authorized on its own private
//! assets. Derived tuples get the intersection of their producers' permissions.

use std::collections::BTreeSet;

use crate::model::Permissions;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PermissionsSpec {
    pub public: bool,
    #[serde(default)]
    pub authorized_ids: Vec<String>,
}

impl PermissionsSpec {
    pub fn public() -> Self {
        PermissionsSpec {
            public: true,
            authorized_ids: vec![],
        }
    }

    pub fn private(ids: &[&str]) -> Self {
        PermissionsSpec {
            public: false,
            authorized_ids: ids.iter().map(|id| id.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PermissionResolver {
    node_id: String,
}

impl PermissionResolver {
    pub fn new(node_id: &str) -> Self {
        PermissionResolver {
            node_id: node_id.to_owned(),
        }
    }

    /// Permissions of a directly created asset.
    pub fn leaf(&self, requested: &PermissionsSpec) -> Permissions {
        if requested.public {
            return Permissions::public();
        }
        let mut ids: BTreeSet<String> = requested.authorized_ids.iter().cloned().collect();
        ids.insert(self.node_id.clone());
        Permissions {
            public: false,
            authorized_ids: ids,
        }
    }

    /// Permissions of an asset derived from `producers`.
    ///
    /// Public producers do not restrict anything. If every producer is public
    /// the result is public; otherwise it is private to the ids authorized by
    /// every private producer. The intersection may be empty, in which case
    /// nobody is authorized.
    pub fn intersect<'a, I>(&self, producers: I) -> Permissions
    where
        I: IntoIterator<Item = &'a Permissions>,
    {
        let mut authorized: Option<BTreeSet<String>> = None;
        for producer in producers {
            if producer.public {
                continue;
            }
            authorized = Some(match authorized {
                None => producer.authorized_ids.clone(),
                Some(ids) => ids
                    .intersection(&producer.authorized_ids)
                    .cloned()
                    .collect(),
            });
        }
        match authorized {
            None => Permissions::public(),
            Some(ids) => {
                if ids.is_empty() {
                    tracing::warn!("Derived permissions authorize nobody");
                }
                Permissions {
                    public: false,
                    authorized_ids: ids,
                }
            }
        }
    }
}
