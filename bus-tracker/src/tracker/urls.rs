//! URL construction for tracker requests.

use reqwest::Url;

use crate::domain::StopCode;

use super::error::{RetrievalError, RetrievalErrorKind};

/// Builds request URLs from request parameters.
pub trait UrlBuilder: Send + Sync {
    fn departures_url(
        &self,
        stop_codes: &[&StopCode],
        num_departures: u8,
    ) -> Result<Url, RetrievalError>;

    fn journey_url(&self, stop_code: &StopCode, journey_id: &str) -> Result<Url, RetrievalError>;
}

/// URL builder for the JSON bus tracker web service.
#[derive(Debug, Clone)]
pub struct TrackerUrlBuilder {
    base_url: Url,
    api_key: String,
}

impl TrackerUrlBuilder {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, RetrievalError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| RetrievalError::with_cause(RetrievalErrorKind::Unknown, e))?;
        Ok(Self {
            base_url,
            api_key: api_key.into(),
        })
    }

    fn request(&self, function: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("module", "json")
            .append_pair("key", &self.api_key)
            .append_pair("function", function);
        url
    }
}

impl UrlBuilder for TrackerUrlBuilder {
    fn departures_url(
        &self,
        stop_codes: &[&StopCode],
        num_departures: u8,
    ) -> Result<Url, RetrievalError> {
        let mut url = self.request("getBusTimes");
        {
            let mut query = url.query_pairs_mut();
            for (i, stop) in stop_codes.iter().enumerate() {
                query.append_pair(&format!("stopCode{}", i + 1), stop.as_str());
            }
            query.append_pair("nb", &num_departures.to_string());
        }
        Ok(url)
    }

    fn journey_url(&self, stop_code: &StopCode, journey_id: &str) -> Result<Url, RetrievalError> {
        let mut url = self.request("getJourneyTimes");
        url.query_pairs_mut()
            .append_pair("stopCode", stop_code.as_str())
            .append_pair("journeyId", journey_id);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> TrackerUrlBuilder {
        TrackerUrlBuilder::new("https://ws.mybustracker.co.uk/", "secret").unwrap()
    }

    fn query(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn departures_url_lists_stops() {
        let a = StopCode::new("36232151").unwrap();
        let b = StopCode::new("36232152").unwrap();

        let url = builder().departures_url(&[&a, &b], 4).unwrap();
        let pairs = query(&url);

        assert_eq!(url.host_str(), Some("ws.mybustracker.co.uk"));
        assert!(pairs.contains(&("function".into(), "getBusTimes".into())));
        assert!(pairs.contains(&("key".into(), "secret".into())));
        assert!(pairs.contains(&("stopCode1".into(), "36232151".into())));
        assert!(pairs.contains(&("stopCode2".into(), "36232152".into())));
        assert!(pairs.contains(&("nb".into(), "4".into())));
    }

    #[test]
    fn journey_url_carries_ids() {
        let stop = StopCode::new("36232151").unwrap();

        let url = builder().journey_url(&stop, "J 1").unwrap();
        let pairs = query(&url);

        assert!(pairs.contains(&("function".into(), "getJourneyTimes".into())));
        assert!(pairs.contains(&("journeyId".into(), "J 1".into())));
    }

    #[test]
    fn rejects_bad_base_url() {
        assert!(TrackerUrlBuilder::new("not a url", "k").is_err());
    }
}
