//! Swag Labs storefront scenarios
//!
//! Elements are addressed by their `data-test` attributes only.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::E2eResult;
use crate::playwright::Page;
use crate::scenario::{run_sub_cases, InteractiveScenario, ScenarioContext, SubCase};

const USERNAME: &str = r#"[data-test="username"]"#;
const PASSWORD: &str = r#"[data-test="password"]"#;
const LOGIN_BUTTON: &str = r#"[data-test="login-button"]"#;
const ERROR: &str = r#"[data-test="error"]"#;
const CART_LINK: &str = r#"[data-test="shopping-cart-link"]"#;
const CART_BADGE: &str = r#"[data-test="shopping-cart-badge"]"#;
const ITEM_NAME: &str = r#"[data-test="inventory-item-name"]"#;
const CHECKOUT: &str = r#"[data-test="checkout"]"#;
const CONTINUE: &str = r#"[data-test="continue"]"#;

const BACKPACK: &str = "sauce-labs-backpack";
const BIKE_LIGHT: &str = "sauce-labs-bike-light";
const BOLT_T_SHIRT: &str = "sauce-labs-bolt-t-shirt";

static INVENTORY_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r".*inventory\.html").expect("valid regex"));

fn add_to_cart(product: &str) -> String {
    format!(r#"[data-test="add-to-cart-{}"]"#, product)
}

fn remove_from_cart(product: &str) -> String {
    format!(r#"[data-test="remove-{}"]"#, product)
}

async fn submit_login(page: &mut dyn Page, username: &str, password: &str) -> E2eResult<()> {
    page.fill(USERNAME, username).await?;
    page.fill(PASSWORD, password).await?;
    page.click(LOGIN_BUTTON).await
}

/// Log in with the configured standard identity
async fn login(page: &mut dyn Page, ctx: &ScenarioContext) -> E2eResult<()> {
    let credentials = ctx.credentials();
    submit_login(page, &credentials.principal, credentials.secret()).await
}

pub struct Login;

#[async_trait]
impl InteractiveScenario for Login {
    fn name(&self) -> &str {
        "C1 - login"
    }

    async fn run(&self, page: &mut dyn Page, ctx: &ScenarioContext) -> E2eResult<()> {
        login(page, ctx).await?;

        let mut expect = ctx.expect(page);
        expect.to_have_url(&INVENTORY_URL).await?;
        expect.to_be_visible(CART_LINK).await
    }
}

pub struct InvalidCredentials {
    pub username: &'static str,
    pub password: &'static str,
    pub expected_error: &'static str,
}

pub const INVALID_CREDENTIALS: [InvalidCredentials; 4] = [
    InvalidCredentials {
        username: "locked_out_user",
        password: "secret_sauce",
        expected_error: "Sorry, this user has been locked out.",
    },
    InvalidCredentials {
        username: "",
        password: "secret_sauce",
        expected_error: "Username is required",
    },
    InvalidCredentials {
        username: "standard_user",
        password: "",
        expected_error: "Password is required",
    },
    InvalidCredentials {
        username: "invalid_user",
        password: "invalid_pass",
        expected_error: "Username and password do not match",
    },
];

#[async_trait]
impl SubCase for InvalidCredentials {
    fn label(&self) -> String {
        if self.username.is_empty() {
            "empty-username".to_string()
        } else if self.password.is_empty() {
            format!("{}-empty-password", self.username)
        } else {
            self.username.to_string()
        }
    }

    async fn run(&self, page: &mut dyn Page, ctx: &ScenarioContext) -> E2eResult<()> {
        submit_login(page, self.username, self.password).await?;

        let mut expect = ctx.expect(page);
        expect.to_be_visible(ERROR).await?;
        expect.to_contain_text(ERROR, self.expected_error).await
    }

    async fn reset(&self, page: &mut dyn Page, _ctx: &ScenarioContext) -> E2eResult<()> {
        page.fill(USERNAME, "").await?;
        page.fill(PASSWORD, "").await
    }
}

pub struct InvalidLogins;

#[async_trait]
impl InteractiveScenario for InvalidLogins {
    fn name(&self) -> &str {
        "C1.1 - login with invalid credentials"
    }

    async fn run(&self, page: &mut dyn Page, ctx: &ScenarioContext) -> E2eResult<()> {
        run_sub_cases(page, ctx, &INVALID_CREDENTIALS).await
    }
}

pub struct Cart;

#[async_trait]
impl InteractiveScenario for Cart {
    fn name(&self) -> &str {
        "C2 - add and remove cart products"
    }

    async fn run(&self, page: &mut dyn Page, ctx: &ScenarioContext) -> E2eResult<()> {
        login(page, ctx).await?;

        for product in [BACKPACK, BIKE_LIGHT, BOLT_T_SHIRT] {
            page.click(&add_to_cart(product)).await?;
        }
        ctx.expect(page).to_have_text(CART_BADGE, "3").await?;

        for product in [BACKPACK, BIKE_LIGHT] {
            page.click(&remove_from_cart(product)).await?;
        }
        ctx.expect(page).to_have_text(CART_BADGE, "1").await?;

        page.click(CART_LINK).await?;
        ctx.expect(page).to_have_text(ITEM_NAME, "Sauce Labs Bolt T-Shirt").await
    }
}

pub struct CheckoutWithoutCustomerInfo;

#[async_trait]
impl InteractiveScenario for CheckoutWithoutCustomerInfo {
    fn name(&self) -> &str {
        "C3 - checkout without customer info"
    }

    async fn run(&self, page: &mut dyn Page, ctx: &ScenarioContext) -> E2eResult<()> {
        login(page, ctx).await?;
        page.click(&add_to_cart(BACKPACK)).await?;

        page.click(CART_LINK).await?;
        page.click(CHECKOUT).await?;
        page.click(CONTINUE).await?;

        let mut expect = ctx.expect(page);
        expect.to_be_visible(ERROR).await?;
        expect.to_contain_text(ERROR, "Error: First Name is required").await
    }
}
