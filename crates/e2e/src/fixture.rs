//! The storefront page, modelled in-process
//!
//! Mirrors the DOM contract of the deployed categories page: a
//! `categories-list` of four single-select `category-item`s carrying
//! `data-elementid` / `data-selected`, and one `product-link` per product
//! currently shown.

use crate::memory::{Document, EventKind, MemoryFactory, NodeId, PageModel};
use crate::selector::Selector;

pub const CATEGORIES: [&str; 4] = ["electronics", "jewelery", "men's clothing", "women's clothing"];

/// (id, category, title)
pub const PRODUCTS: [(u32, &str, &str); 20] = [
    (1, "men's clothing", "Fjallraven - Foldsack No. 1 Backpack, Fits 15 Laptops"),
    (2, "men's clothing", "Mens Casual Premium Slim Fit T-Shirts"),
    (3, "men's clothing", "Mens Cotton Jacket"),
    (4, "men's clothing", "Mens Casual Slim Fit"),
    (5, "jewelery", "John Hardy Women's Legends Naga Gold & Silver Dragon Station Chain Bracelet"),
    (6, "jewelery", "Solid Gold Petite Micropave"),
    (7, "jewelery", "White Gold Plated Princess"),
    (8, "jewelery", "Pierced Owl Rose Gold Plated Stainless Steel Double"),
    (9, "electronics", "WD 2TB Elements Portable External Hard Drive - USB 3.0"),
    (10, "electronics", "SanDisk SSD PLUS 1TB Internal SSD - SATA III 6 Gb/s"),
    (11, "electronics", "Silicon Power 256GB SSD 3D NAND A55 SLC Cache Performance Boost SATA III 2.5"),
    (12, "electronics", "WD 4TB Gaming Drive Works with Playstation 4 Portable External Hard Drive"),
    (13, "electronics", "Acer SB220Q bi 21.5 inches Full HD (1920 x 1080) IPS Ultra-Thin"),
    (14, "electronics", "Samsung 49-Inch CHG90 144Hz Curved Gaming Monitor"),
    (15, "women's clothing", "BIYLACLESEN Women's 3-in-1 Snowboard Jacket Winter Coats"),
    (16, "women's clothing", "Lock and Love Women's Removable Hooded Faux Leather Moto Biker Jacket"),
    (17, "women's clothing", "Rain Jacket Women Windbreaker Striped Climbing Raincoats"),
    (18, "women's clothing", "MBJ Women's Solid Short Sleeve Boat Neck V"),
    (19, "women's clothing", "Opna Women's Short Sleeve Moisture"),
    (20, "women's clothing", "DANVOUY Womens T Shirt Casual Cotton Short"),
];

/// Page state: which category is selected, if any
#[derive(Debug, Default)]
pub struct Storefront {
    selected: Option<&'static str>,
    items: Vec<(NodeId, &'static str)>,
    products: NodeId,
}

impl Storefront {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<&'static str> {
        self.selected
    }

    fn render_products(&self, doc: &mut Document) {
        doc.clear_children(self.products);
        let shown = PRODUCTS
            .iter()
            .filter(|(_, category, _)| self.selected.map_or(true, |s| s == *category));
        for (id, category, title) in shown {
            let item = doc.append(self.products, "li", &[("data-category", *category)]);
            let href = format!("/product/{}", id);
            let link = doc.append(item, "a", &[("data-testid", "product-link"), ("href", href.as_str())]);
            doc.set_text(link, title);
        }
    }

    /// Select `category`; selecting the current one again changes nothing
    fn select(&mut self, doc: &mut Document, category: &'static str) {
        if self.selected == Some(category) {
            return;
        }
        self.selected = Some(category);
        for (node, name) in &self.items {
            let flag = if *name == category { "true" } else { "false" };
            doc.set_attribute(*node, "data-selected", flag);
        }
        self.render_products(doc);
    }
}

impl PageModel for Storefront {
    fn render(&mut self, doc: &mut Document) {
        self.selected = None;
        self.items.clear();

        let root = doc.root();
        let nav = doc.append(root, "ul", &[("data-testid", "categories-list")]);
        for name in CATEGORIES {
            let item = doc.append(
                nav,
                "li",
                &[
                    ("data-testid", "category-item"),
                    ("data-elementid", name),
                    ("data-selected", "false"),
                ],
            );
            doc.set_text(item, name);
            self.items.push((item, name));
        }

        self.products = doc.append(root, "ul", &[("data-testid", "products-list")]);
        self.render_products(doc);
    }

    fn on_event(&mut self, doc: &mut Document, event: EventKind, target: NodeId) {
        if event != EventKind::Click {
            return;
        }
        let item = Selector::test_id("category-item");
        let Some(node) = doc.closest(target, item.subject()) else {
            return;
        };
        if let Some(&(_, name)) = self.items.iter().find(|(n, _)| *n == node) {
            self.select(doc, name);
        }
    }
}

/// An in-process storefront served under `base_url`
pub fn storefront(base_url: impl Into<String>) -> MemoryFactory {
    MemoryFactory::new(base_url, || Box::new(Storefront::new()))
}

pub fn product_count(category: Option<&str>) -> usize {
    PRODUCTS
        .iter()
        .filter(|(_, c, _)| category.map_or(true, |want| want == *c))
        .count()
}
