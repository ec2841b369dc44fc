use crate::domain::model::{LayerId, LayerMatch, LayerSet};
use crate::utils::error::{DiffError, Result};
use crate::utils::validation::validate_layer_list;

/// Splits the identifiers of two layer sets into old-only, new-only and shared.
pub fn match_layers(old: &LayerSet, new: &LayerSet) -> LayerMatch {
    let old_ids = old.ids();
    let new_ids = new.ids();

    let layer_match = LayerMatch {
        unique_to_old: old_ids.difference(&new_ids).cloned().collect(),
        unique_to_new: new_ids.difference(&old_ids).cloned().collect(),
        common: old_ids.intersection(&new_ids).cloned().collect(),
    };

    // 新增或移除圖層屬正常改版，只記錄不視為錯誤
    if !layer_match.unique_to_old.is_empty() {
        tracing::warn!(
            "Unique extensions found in old gerber package: {}",
            join(layer_match.unique_to_old.iter())
        );
    }
    if !layer_match.unique_to_new.is_empty() {
        tracing::warn!(
            "Unique extensions found in new gerber package: {}",
            join(layer_match.unique_to_new.iter())
        );
    }

    layer_match
}

impl LayerMatch {
    /// Page order for the document: `order` verbatim when given, the shared
    /// layers otherwise. Every requested layer must be shared.
    pub fn select(&self, order: Option<&[LayerId]>) -> Result<Vec<LayerId>> {
        let selected = match order {
            None => self.common.clone(),
            Some(order) => {
                validate_layer_list("layer_order", order)?;
                if let Some(missing) = order.iter().find(|layer| !self.common.contains(*layer)) {
                    let location = if self.unique_to_old.contains(missing) {
                        "the new package"
                    } else if self.unique_to_new.contains(missing) {
                        "the old package"
                    } else {
                        "either package"
                    };
                    return Err(DiffError::LayerNotFound {
                        layer: missing.to_string(),
                        location: location.to_string(),
                    });
                }
                order.to_vec()
            }
        };

        if selected.is_empty() {
            return Err(DiffError::NoCommonLayers);
        }
        Ok(selected)
    }
}

fn join<'a>(layers: impl Iterator<Item = &'a LayerId>) -> String {
    layers.map(LayerId::as_str).collect::<Vec<_>>().join(", ")
}
