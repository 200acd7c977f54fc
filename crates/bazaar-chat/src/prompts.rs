//! Instruction text for the generation calls.

const CLASSIFY_INSTRUCTIONS: &str = "\
You are a marketplace assistant. Decide whether you need the user's email \
address before you can help with their request.

Requests that need an email (they concern the user's own data):
- finding or checking an order, order status
- tracking a shipment, where a package is
- purchase history, \"my orders\"
- cancelling an order, returning an item
- account or profile questions

Requests that do not need an email:
- browsing or searching products
- prices and product details
- store and distribution center locations
- general help

If you need the email, ask for it politely and set needsEmail to true with \
responseType ask_email. Otherwise answer directly with responseType \
general_response.";

const COLLECTION_LAYOUTS: &str = "\
- accounts: {id, first_name, last_name, email, age, gender, state, city, country, created_at}
- orders: {order_id, user_id, status, gender, created_at, returned_at, shipped_at, delivered_at, num_of_item}
- order_items: {id, order_id, user_id, product_id, inventory_item_id, status, created_at, shipped_at, delivered_at, returned_at}
- products: {id, cost, category, name, brand, retail_price, department, sku, distribution_center_id}
- inventory_items: {id, product_id, created_at, sold_at, cost, product_category, product_name, product_brand, product_retail_price, product_department, product_sku, product_distribution_center_id}
- distribution_centers: {id, name, latitude, longitude}";

/// System prompt for intent classification.
pub fn classify_system() -> &'static str {
    CLASSIFY_INSTRUCTIONS
}

/// System prompt for query synthesis.
pub fn synthesize_system(original_request: &str, email: &str, account_id: i64) -> String {
    format!(
        "You are a marketplace assistant. The user's original request was: \"{original_request}\"
They have identified themselves with the email \"{email}\".
Their account id is {account_id}.

Turn the original request into a single document query. Queries against \
accounts must filter on id: {account_id}; queries against orders or \
order_items must filter on user_id: {account_id}. Never produce a query that \
reads another user's data or that omits this filter.

Available collections:
{COLLECTION_LAYOUTS}

Supported operations: find, findOne, count. Filters may use $eq, $ne, $gt, \
$gte, $lt, $lte, $in, $nin, $exists, $regex, $and, $or and $nor.

Examples:
- \"find my order\", \"check my orders\", \"order status\" -> orders with user_id: {account_id}
- \"my purchases\", \"purchase history\" -> orders with user_id: {account_id}, newest first
- \"my order items\" -> order_items with user_id: {account_id}
- \"how many orders do I have\" -> count on orders with user_id: {account_id}"
    )
}

pub fn synthesize_user(original_request: &str, email: &str, account_id: i64) -> String {
    format!(
        "Original request: \"{original_request}\"\nEmail provided: \"{email}\"\n\
         Generate the database query using account id {account_id}"
    )
}

/// System prompt for formatting query results.
pub fn format_system(original_request: &str, email: &str) -> String {
    format!(
        "You are a marketplace assistant. The user asked: \"{original_request}\"
Their email: \"{email}\"

Write a friendly reply based on the query results.
- If orders were found, mention each order's number and status, e.g. \
\"Order #12345 has shipped and should arrive soon.\"
- If there are several results, list them clearly with their key details.
- Set hasResults and resultCount to describe the results you were given.

Stay conversational and focus on what the user originally asked for."
    )
}

pub fn format_user(original_request: &str, results: &str) -> String {
    format!("Original request: \"{original_request}\"\nQuery results: {results}")
}
