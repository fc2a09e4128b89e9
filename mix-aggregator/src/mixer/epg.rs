use std::collections::HashMap;

use interfaces::{Config, EpgFilterType, SourceType};
use tracing::{debug, warn};

use crate::codec::epg::{self, Channel, Guide};
use crate::filter::Filter;
use crate::traits::Sourcer;
use crate::types::Result;

/// Channels keyed by id. Order is first appearance; a later copy of the
/// same id replaces the earlier one in place.
#[derive(Default)]
struct ChannelSet {
    channels: Vec<Channel>,
    index: HashMap<String, usize>,
}

impl ChannelSet {
    fn insert(&mut self, channel: Channel) {
        match self.index.get(&channel.id) {
            Some(&i) => self.channels[i] = channel,
            None => {
                self.index.insert(channel.id.clone(), self.channels.len());
                self.channels.push(channel);
            }
        }
    }
}

/// Merge every guide filter rule. A disabled guide is empty, not an error.
pub async fn mix_epg<S>(config: &Config, sourcer: &S) -> Result<Guide>
where
    S: Sourcer + ?Sized,
{
    if config.epg.disable {
        return Ok(Guide::default());
    }

    let mut channels = ChannelSet::default();
    let mut programmes = Vec::new();

    for rule in &config.epg.filters {
        if rule.mix.disabled || rule.mix.source_name.is_empty() {
            continue;
        }
        let Some(mode) = EpgFilterType::parse(&rule.filter_by) else {
            warn!("Skipping guide rule on {} with unknown filter_by {:?}", rule.mix.source_name, rule.filter_by);
            continue;
        };

        let source = sourcer
            .get_source(&rule.mix.source_name)
            .await
            .map_err(|e| e.in_rule("epg"))?;
        if source.source_type != SourceType::Epg {
            debug!("Skipping guide rule on non-guide source {}", source.name);
            continue;
        }
        let guide = epg::parse(source.data()).map_err(|e| e.in_rule("epg"))?;
        let filter = Filter::from_rule(rule);

        match mode {
            EpgFilterType::ChannelId => {
                for channel in guide.channels.into_iter().filter(|c| filter.test(&c.id)) {
                    channels.insert(channel);
                }
                programmes.extend(guide.programmes.into_iter().filter(|p| filter.test(&p.channel)));
            }
            EpgFilterType::ProgramTitle => {
                let by_id: HashMap<&str, &Channel> = guide.channels.iter().map(|c| (c.id.as_str(), c)).collect();
                for programme in guide.programmes.iter().filter(|p| filter.test(p.title())) {
                    if let Some(channel) = by_id.get(programme.channel.as_str()) {
                        channels.insert((*channel).clone());
                    }
                    programmes.push(programme.clone());
                }
            }
        }
    }

    Ok(Guide {
        channels: channels.channels,
        programmes,
    })
}
