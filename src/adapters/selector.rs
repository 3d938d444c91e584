use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::app::{GleanerError, Result};
use crate::domain::{LinkRecord, PageRecord};
use crate::scraper::{canonicalize_url, BrowserSession, Document, LinkMap, RetryPolicy, SiteAdapter};

static DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:[.,]\d+)?").expect("valid regex"));
static IMAGE: Lazy<Selector> = Lazy::new(|| Selector::parse("img").expect("valid selector"));

/// Selectors for one product card on a results page.
///
/// All sub-selectors are evaluated inside the card element.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CardSelectors {
    pub container: String,
    pub link: String,
    pub title: String,
    pub price: Option<String>,
    pub rating: Option<String>,
    pub review_count: Option<String>,
    pub image: Option<String>,
}

/// Selectors for a product detail page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailSelectors {
    pub name: Option<String>,
    /// Matches every breadcrumb part, in order.
    pub breadcrumb: Option<String>,
    pub price: Option<String>,
    pub rating: Option<String>,
    pub review_count: Option<String>,
    pub brand: Option<String>,
    pub seller: Option<String>,
    pub seller_link: Option<String>,
    pub description: Option<String>,
    pub images: Option<String>,
    /// One row of the specification table.
    pub spec_row: Option<String>,
    pub spec_key: Option<String>,
    pub spec_value: Option<String>,
    pub product_code: Option<String>,
    pub model: Option<String>,
    /// Accordions or "show more" controls clicked before extraction.
    pub expand: Vec<String>,
}

/// A `[[sites]]` entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub name: String,
    pub base_url: String,
    pub search_input: String,
    pub next_page: String,
    /// Dialogs to dismiss or filters to pick before typing the keyword.
    pub pre_search_clicks: Vec<String>,
    pub card: CardSelectors,
    pub detail: DetailSelectors,
}

struct CardRules {
    container: Selector,
    link: Selector,
    title: Selector,
    price: Option<Selector>,
    rating: Option<Selector>,
    review_count: Option<Selector>,
    image: Option<Selector>,
}

struct DetailRules {
    name: Option<Selector>,
    breadcrumb: Option<Selector>,
    price: Option<Selector>,
    rating: Option<Selector>,
    review_count: Option<Selector>,
    brand: Option<Selector>,
    seller: Option<Selector>,
    seller_link: Option<Selector>,
    description: Option<Selector>,
    images: Option<Selector>,
    spec_row: Option<Selector>,
    spec_key: Option<Selector>,
    spec_value: Option<Selector>,
    product_code: Option<Selector>,
    model: Option<Selector>,
}

fn compile(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|_| GleanerError::Selector(selector.to_string()))
}

fn compile_opt(selector: &Option<String>) -> Result<Option<Selector>> {
    selector.as_deref().map(compile).transpose()
}

/// Site adapter driven entirely by CSS selectors from the config file.
pub struct SelectorAdapter {
    config: SiteConfig,
    card: CardRules,
    detail: DetailRules,
}

impl SelectorAdapter {
    /// Compile every selector up front so a typo fails at startup.
    pub fn new(config: SiteConfig) -> Result<Self> {
        if config.name.trim().is_empty() {
            return Err(GleanerError::Config("site without a name".into()));
        }
        url::Url::parse(&config.base_url)?;
        compile(&config.search_input)?;
        compile(&config.next_page)?;
        for selector in config.pre_search_clicks.iter().chain(&config.detail.expand) {
            compile(selector)?;
        }

        let c = &config.card;
        let card = CardRules {
            container: compile(&c.container)?,
            link: compile(&c.link)?,
            title: compile(&c.title)?,
            price: compile_opt(&c.price)?,
            rating: compile_opt(&c.rating)?,
            review_count: compile_opt(&c.review_count)?,
            image: compile_opt(&c.image)?,
        };

        let d = &config.detail;
        let detail = DetailRules {
            name: compile_opt(&d.name)?,
            breadcrumb: compile_opt(&d.breadcrumb)?,
            price: compile_opt(&d.price)?,
            rating: compile_opt(&d.rating)?,
            review_count: compile_opt(&d.review_count)?,
            brand: compile_opt(&d.brand)?,
            seller: compile_opt(&d.seller)?,
            seller_link: compile_opt(&d.seller_link)?,
            description: compile_opt(&d.description)?,
            images: compile_opt(&d.images)?,
            spec_row: compile_opt(&d.spec_row)?,
            spec_key: compile_opt(&d.spec_key)?,
            spec_value: compile_opt(&d.spec_value)?,
            product_code: compile_opt(&d.product_code)?,
            model: compile_opt(&d.model)?,
        };

        Ok(Self {
            config,
            card,
            detail,
        })
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    fn resolve(&self, href: &str) -> Option<String> {
        canonicalize_url(&self.config.base_url, href)
    }

    fn parse_card(&self, card: ElementRef<'_>, keyword: &str) -> Option<LinkRecord> {
        let url = card
            .select(&self.card.link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| self.resolve(href))?;
        let title = card
            .select(&self.card.title)
            .next()
            .and_then(|el| {
                non_empty(text_of(el))
                    .or_else(|| attr_of(el, &["title", "alt"]))
                    .or_else(|| el.select(&IMAGE).next().and_then(|img| attr_of(img, &["alt"])))
            })?;

        let first_text = |rule: &Option<Selector>| {
            rule.as_ref()
                .and_then(|s| card.select(s).next())
                .and_then(|el| non_empty(text_of(el)))
        };

        let mut record = LinkRecord::new(url);
        record.title = Some(title);
        record.price = first_text(&self.card.price);
        record.rating = first_text(&self.card.rating).and_then(|t| parse_decimal(&t));
        record.review_count = first_text(&self.card.review_count).and_then(|t| parse_count(&t));
        record.image_url = self
            .card
            .image
            .as_ref()
            .and_then(|s| card.select(s).next())
            .and_then(|el| attr_of(el, &["src", "data-src"]))
            .and_then(|src| self.resolve(&src));
        record.keyword = keyword.to_string();
        Some(record)
    }

    fn parse_detail(&self, doc: &Document) -> PageRecord {
        let html = doc.parse();
        let first_text = |rule: &Option<Selector>| {
            rule.as_ref()
                .and_then(|s| html.select(s).next())
                .and_then(|el| non_empty(text_of(el)))
        };

        let mut record = PageRecord::new(doc.url.clone());
        record.name = first_text(&self.detail.name);
        record.price = first_text(&self.detail.price);
        record.rating = first_text(&self.detail.rating).and_then(|t| parse_decimal(&t));
        record.review_count = first_text(&self.detail.review_count).and_then(|t| parse_count(&t));
        record.brand = first_text(&self.detail.brand);
        record.seller = first_text(&self.detail.seller);
        record.description = first_text(&self.detail.description);
        record.product_code = first_text(&self.detail.product_code);
        record.model = first_text(&self.detail.model);

        if let Some(rule) = &self.detail.breadcrumb {
            let parts: Vec<String> = html.select(rule).map(text_of).collect();
            record.set_category_path(&parts);
        }

        record.seller_url = self
            .detail
            .seller_link
            .as_ref()
            .and_then(|s| html.select(s).next())
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| self.resolve(href));

        if let Some(rule) = &self.detail.images {
            for img in html.select(rule) {
                if let Some(src) = attr_of(img, &["src", "data-src"]).and_then(|s| self.resolve(&s))
                {
                    if !record.images.contains(&src) {
                        record.images.push(src);
                    }
                }
            }
        }

        if let (Some(row), Some(key), Some(value)) = (
            &self.detail.spec_row,
            &self.detail.spec_key,
            &self.detail.spec_value,
        ) {
            for tr in html.select(row) {
                let k = tr.select(key).next().map(text_of).and_then(non_empty);
                let v = tr.select(value).next().map(text_of).and_then(non_empty);
                if let (Some(k), Some(v)) = (k, v) {
                    record.characteristics.entry(k).or_insert(v);
                }
            }
        }

        record
    }
}

#[async_trait]
impl SiteAdapter for SelectorAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn search_input_selector(&self) -> &str {
        &self.config.search_input
    }

    fn next_page_selector(&self) -> &str {
        &self.config.next_page
    }

    fn discover_links(&self, doc: &Document, keyword: &str) -> LinkMap {
        let html = doc.parse();
        let mut links = LinkMap::new();
        let mut dropped = 0;

        for card in html.select(&self.card.container) {
            match self.parse_card(card, keyword) {
                Some(record) => {
                    links.entry(record.url.clone()).or_insert(record);
                }
                None => dropped += 1,
            }
        }

        if dropped > 0 {
            debug!("{}: dropped {} cards without link or title", self.name(), dropped);
        }
        links
    }

    async fn extract_detail(
        &self,
        session: &dyn BrowserSession,
        retry: &RetryPolicy,
    ) -> Result<PageRecord> {
        for selector in &self.config.detail.expand {
            let selector = selector.as_str();
            if let Err(e) = retry
                .run("expand section", move || session.click_if_present(selector))
                .await
            {
                if e.is_session_fatal() {
                    return Err(e);
                }
                warn!("{}: could not expand '{}': {}", self.name(), selector, e);
            }
        }

        let doc = session.current_document().await?;
        Ok(self.parse_detail(&doc))
    }

    async fn input_search_params(
        &self,
        session: &dyn BrowserSession,
        keyword: &str,
        retry: &RetryPolicy,
    ) -> Result<()> {
        let base = self.base_url();
        retry.run("open site", move || session.navigate(base)).await?;

        for selector in &self.config.pre_search_clicks {
            let selector = selector.as_str();
            let clicked = retry
                .run("pre-search click", move || session.click_if_present(selector))
                .await?;
            debug!("Pre-search '{}' clicked: {}", selector, clicked);
        }

        let input = self.search_input_selector();
        retry
            .run("submit search", move || session.type_and_submit(input, keyword))
            .await
    }
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn attr_of(el: ElementRef<'_>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| el.value().attr(name))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

/// First decimal number in the text, accepting a comma as separator.
fn parse_decimal(text: &str) -> Option<f64> {
    DECIMAL
        .find(text)
        .and_then(|m| m.as_str().replace(',', ".").parse().ok())
}

/// All digits in the text as one count ("1.234 avaliações" is 1234).
fn parse_count(text: &str) -> Option<u64> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::testing::{quick_retry, ScriptState, ScriptedSession};

    fn shop_config() -> SiteConfig {
        SiteConfig {
            name: "shop".into(),
            base_url: "https://shop.example".into(),
            search_input: "input#q".into(),
            next_page: "a.next".into(),
            pre_search_clicks: vec!["button.accept-cookies".into()],
            card: CardSelectors {
                container: "li.card".into(),
                link: "a.title".into(),
                title: "a.title".into(),
                price: Some(".price".into()),
                rating: Some(".stars".into()),
                review_count: Some(".reviews".into()),
                image: Some("img".into()),
            },
            detail: DetailSelectors {
                name: Some("h1".into()),
                breadcrumb: Some("nav.crumbs a".into()),
                price: Some(".price".into()),
                brand: Some(".brand".into()),
                seller_link: Some("a.seller".into()),
                images: Some(".gallery img".into()),
                spec_row: Some("table.specs tr".into()),
                spec_key: Some("th".into()),
                spec_value: Some("td".into()),
                expand: vec!["button.more".into()],
                ..Default::default()
            },
        }
    }

    const RESULTS: &str = r#"
        <ul>
          <li class="card">
            <a class="title" href="/p/1?utm_source=feed">Roteador  AX3000</a>
            <span class="price">R$ 399,90</span>
            <span class="stars">4,7 de 5</span>
            <span class="reviews">(1.234)</span>
            <img data-src="/img/1.jpg">
          </li>
          <li class="card"><span class="price">R$ 10</span></li>
          <li class="card"><a class="title" href="https://shop.example/p/2"><img alt="Switch 8p"></a></li>
        </ul>"#;

    const DETAIL: &str = r#"
        <nav class="crumbs"><a>Informática</a> <a> Redes </a></nav>
        <h1>Roteador AX3000</h1>
        <span class="price">R$ 389,90</span>
        <span class="brand">Acme</span>
        <a class="seller" href="/loja/acme">Acme Store</a>
        <div class="gallery"><img src="/img/1.jpg"><img src="/img/1.jpg"><img src="/img/2.jpg"></div>
        <table class="specs">
          <tr><th>Certificado Anatel</th><td>01234-20-05678</td></tr>
          <tr><th>Cor</th><td>Preto</td></tr>
          <tr><th></th><td>orphan</td></tr>
        </table>"#;

    #[test]
    fn test_invalid_selector_is_rejected() {
        let mut config = shop_config();
        config.card.container = "li[".into();
        assert!(matches!(
            SelectorAdapter::new(config),
            Err(GleanerError::Selector(s)) if s == "li["
        ));
    }

    #[test]
    fn test_cards_become_link_records() {
        let adapter = SelectorAdapter::new(shop_config()).unwrap();
        let doc = Document::new("https://shop.example/busca?q=roteador", RESULTS);

        let links = adapter.discover_links(&doc, "roteador");

        assert_eq!(links.len(), 2);
        let first = &links["https://shop.example/p/1"];
        assert_eq!(first.title.as_deref(), Some("Roteador AX3000"));
        assert_eq!(first.price.as_deref(), Some("R$ 399,90"));
        assert_eq!(first.rating, Some(4.7));
        assert_eq!(first.review_count, Some(1234));
        assert_eq!(first.image_url.as_deref(), Some("https://shop.example/img/1.jpg"));
        assert_eq!(first.keyword, "roteador");

        let second = &links["https://shop.example/p/2"];
        assert_eq!(second.title.as_deref(), Some("Switch 8p"));
    }

    #[tokio::test]
    async fn test_detail_extraction() {
        let session = ScriptedSession::new(ScriptState {
            details: [("https://shop.example/p/1".to_string(), DETAIL.to_string())].into(),
            ..Default::default()
        });
        session.navigate("https://shop.example/p/1").await.unwrap();
        let adapter = SelectorAdapter::new(shop_config()).unwrap();

        let record = adapter.extract_detail(&session, &quick_retry()).await.unwrap();

        assert!(record.is_complete());
        assert_eq!(record.category.as_deref(), Some("Informática|Redes"));
        assert_eq!(record.name.as_deref(), Some("Roteador AX3000"));
        assert_eq!(record.brand.as_deref(), Some("Acme"));
        assert_eq!(record.seller_url.as_deref(), Some("https://shop.example/loja/acme"));
        assert_eq!(record.images.len(), 2);
        assert_eq!(record.characteristics.len(), 2);
        assert_eq!(record.characteristics["Cor"], "Preto");
        assert_eq!(session.count_calls("click button.more"), 1);
    }

    #[tokio::test]
    async fn test_detail_without_breadcrumb_is_incomplete() {
        let session = ScriptedSession::new(ScriptState {
            details: [("https://shop.example/p/9".to_string(), "<h1>Gone</h1>".to_string())].into(),
            ..Default::default()
        });
        session.navigate("https://shop.example/p/9").await.unwrap();
        let adapter = SelectorAdapter::new(shop_config()).unwrap();

        let record = adapter.extract_detail(&session, &quick_retry()).await.unwrap();
        assert!(!record.is_complete());
        assert_eq!(record.name.as_deref(), Some("Gone"));
    }

    #[tokio::test]
    async fn test_search_flow_clicks_pre_search_controls() {
        let session = ScriptedSession::default();
        let adapter = SelectorAdapter::new(shop_config()).unwrap();

        adapter
            .input_search_params(&session, "roteador", &quick_retry())
            .await
            .unwrap();

        assert_eq!(
            session.calls(),
            vec![
                "navigate https://shop.example".to_string(),
                "click button.accept-cookies".to_string(),
                "submit input#q roteador".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_search_flow_retries_opening_the_site() {
        let session = ScriptedSession::new(ScriptState {
            failing_navigations: 2,
            ..Default::default()
        });
        let adapter = SelectorAdapter::new(shop_config()).unwrap();

        adapter
            .input_search_params(&session, "roteador", &quick_retry())
            .await
            .unwrap();

        assert_eq!(session.count_calls("navigate https://shop.example"), 3);
        assert_eq!(session.count_calls("submit input#q roteador"), 1);
    }

    #[test]
    fn test_number_parsing() {
        assert_eq!(parse_decimal("4.5 out of 5"), Some(4.5));
        assert_eq!(parse_decimal("no rating"), None);
        assert_eq!(parse_count("(12 reviews)"), Some(12));
        assert_eq!(parse_count("none"), None);
    }
}
