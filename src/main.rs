fn main() {
    focusbuddy_lib::run()
}
